//! In-process stand-in for the protocol engine
//!
//! Stores the tables it is given and drives them the way the real engine
//! does: through the raw function pointers, with every crypto operation
//! wrapped in the engine lock. Used by tests, benches and `sigil unlock`
//! when no engine library is linked.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::ptr;

use thiserror::Error;
use zeroize::Zeroizing;

use super::bridge::SG_SUCCESS;
use super::context::ProtocolEngine;
use super::ffi::{sigil_digest_buffer_free, CryptoProviderTable, DigestBuffer, LockingTable};
use crate::store::IdentityKeyPair;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockEngineError {
    #[error("rejected {0}")]
    Rejected(&'static str),

    #[error("{0} not registered")]
    NotRegistered(&'static str),

    #[error("crypto callback failed with code {0}")]
    Callback(c_int),
}

#[derive(Debug, Default)]
pub struct MockEngine {
    crypto: Option<CryptoProviderTable>,
    locking: Option<LockingTable>,
    identity: Option<Zeroizing<Vec<u8>>>,
    reject: Option<&'static str>,
    extra_unlock: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_crypto_provider() -> Self {
        Self {
            reject: Some("crypto provider"),
            ..Self::default()
        }
    }

    pub fn rejecting_locking() -> Self {
        Self {
            reject: Some("locking functions"),
            ..Self::default()
        }
    }

    /// Sends one more `unlock` than `lock` while loading the identity
    pub fn unlocking_too_often() -> Self {
        Self {
            extra_unlock: true,
            ..Self::default()
        }
    }

    /// Both tables registered
    pub fn is_ready(&self) -> bool {
        self.crypto.is_some() && self.locking.is_some()
    }

    pub fn identity(&self) -> Option<&[u8]> {
        self.identity.as_deref().map(Vec::as_slice)
    }

    pub fn crypto_table(&self) -> Option<&CryptoProviderTable> {
        self.crypto.as_ref()
    }

    pub fn locking_table(&self) -> Option<&LockingTable> {
        self.locking.as_ref()
    }

    pub fn lock(&self) -> Result<(), MockEngineError> {
        let locking = self.locking_or_err()?;
        // SAFETY: the table's user data is kept alive by the owning context.
        unsafe { (locking.lock)(locking.user_data) };
        Ok(())
    }

    pub fn unlock(&self) -> Result<(), MockEngineError> {
        let locking = self.locking_or_err()?;
        // SAFETY: see `lock`.
        unsafe { (locking.unlock)(locking.user_data) };
        Ok(())
    }

    /// Lock `depth` times, run `f`, then unlock as many times
    pub fn with_nested_lock<R>(
        &self,
        depth: usize,
        f: impl FnOnce() -> R,
    ) -> Result<R, MockEngineError> {
        for _ in 0..depth {
            self.lock()?;
        }
        let result = f();
        for _ in 0..depth {
            self.unlock()?;
        }
        Ok(result)
    }

    /// Run a whole HMAC-SHA256 through the registered callbacks
    pub fn hmac_sha256(&self, key: &[u8], chunks: &[&[u8]]) -> Result<Vec<u8>, MockEngineError> {
        let crypto = *self
            .crypto
            .as_ref()
            .ok_or(MockEngineError::NotRegistered("crypto provider"))?;

        self.lock()?;
        // SAFETY: buffers are valid for the given lengths and the user data
        // is kept alive by the owning context.
        let result = unsafe { run_hmac(&crypto, key, chunks) };
        self.unlock()?;
        result
    }

    fn locking_or_err(&self) -> Result<&LockingTable, MockEngineError> {
        self.locking
            .as_ref()
            .ok_or(MockEngineError::NotRegistered("locking functions"))
    }
}

unsafe fn run_hmac(
    crypto: &CryptoProviderTable,
    key: &[u8],
    chunks: &[&[u8]],
) -> Result<Vec<u8>, MockEngineError> {
    let mut context: *mut c_void = ptr::null_mut();
    let rc = (crypto.hmac_sha256_init_func)(
        &mut context,
        key.as_ptr(),
        key.len(),
        crypto.user_data,
    );
    if rc != SG_SUCCESS {
        return Err(MockEngineError::Callback(rc));
    }

    let mut result = Ok(Vec::new());
    for chunk in chunks {
        let rc = (crypto.hmac_sha256_update_func)(
            context,
            chunk.as_ptr(),
            chunk.len(),
            crypto.user_data,
        );
        if rc != SG_SUCCESS {
            result = Err(MockEngineError::Callback(rc));
            break;
        }
    }

    if result.is_ok() {
        let mut output: *mut DigestBuffer = ptr::null_mut();
        let rc = (crypto.hmac_sha256_final_func)(context, &mut output, crypto.user_data);
        result = if rc == SG_SUCCESS {
            let digest = (*output).as_slice().to_vec();
            sigil_digest_buffer_free(output);
            Ok(digest)
        } else {
            Err(MockEngineError::Callback(rc))
        };
    }

    (crypto.hmac_sha256_cleanup_func)(context, crypto.user_data);
    result
}

impl ProtocolEngine for MockEngine {
    type Error = MockEngineError;

    fn set_crypto_provider(&mut self, provider: CryptoProviderTable) -> Result<(), Self::Error> {
        if self.reject == Some("crypto provider") {
            return Err(MockEngineError::Rejected("crypto provider"));
        }
        self.crypto = Some(provider);
        Ok(())
    }

    fn set_locking_functions(&mut self, locking: LockingTable) -> Result<(), Self::Error> {
        if self.reject == Some("locking functions") {
            return Err(MockEngineError::Rejected("locking functions"));
        }
        self.locking = Some(locking);
        Ok(())
    }

    fn load_identity_key_pair(&mut self, identity: IdentityKeyPair<'_>) -> Result<(), Self::Error> {
        if !self.is_ready() {
            return Err(MockEngineError::NotRegistered("crypto provider"));
        }
        if self.extra_unlock {
            self.with_nested_lock(1, || ())?;
            self.unlock()?;
        }
        self.identity = Some(Zeroizing::new(identity.as_bytes().to_vec()));
        Ok(())
    }
}
