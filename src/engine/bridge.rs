//! Crypto provider bridge
//!
//! Implements the callbacks the protocol engine needs from its host: the
//! reentrant lock and an incremental HMAC-SHA256. The engine drives an HMAC
//! through four calls:
//!
//! ```text
//! init(key) ──► handle ──► update(data)* ──► final() ──► digest
//!                                                  └──► cleanup(handle)
//! ```
//!
//! HMAC state never leaves the bridge. The engine holds only a `Handle`
//! into the bridge's table; the digest is the only output it owns.

use std::os::raw::c_int;

use parking_lot::Mutex;
use ring::hmac;
use thiserror::Error;
use tracing::{error, trace, warn};

use super::handles::{Handle, HandleError, HandleTable};
use super::lock::EngineLock;

/// Success return code expected by the engine
pub const SG_SUCCESS: c_int = 0;
/// Allocation failure
pub const SG_ERR_NOMEM: c_int = -12;
/// Invalid argument
pub const SG_ERR_INVAL: c_int = -22;
/// Unclassified failure
pub const SG_ERR_UNKNOWN: c_int = -1000;
/// Generic HMAC update failure
pub const HMAC_UPDATE_FAILED: c_int = -1;

/// HMAC-SHA256 digest length
pub const HMAC_SHA256_LEN: usize = 32;

/// Failures reported back to the engine through its error codes
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CallbackError {
    #[error("out of memory")]
    NoMemory,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("HMAC computation failed")]
    Computation,

    #[error("unknown error")]
    Unknown,
}

impl CallbackError {
    /// Engine error code for this failure
    pub fn code(self) -> c_int {
        match self {
            Self::NoMemory => SG_ERR_NOMEM,
            Self::InvalidArgument => SG_ERR_INVAL,
            Self::Computation => HMAC_UPDATE_FAILED,
            Self::Unknown => SG_ERR_UNKNOWN,
        }
    }
}

impl From<HandleError> for CallbackError {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::OutOfMemory(_) => Self::NoMemory,
            HandleError::Exhausted => Self::Unknown,
        }
    }
}

/// HMAC-SHA256 primitive in the shape the engine calls it
pub trait CryptoProvider: Send + Sync {
    /// Start an HMAC keyed with `key`
    fn hmac_sha256_init(&self, key: &[u8]) -> Result<Handle, CallbackError>;

    /// Feed more data into a running HMAC
    fn hmac_sha256_update(&self, handle: Handle, data: &[u8]) -> Result<(), CallbackError>;

    /// Finish the HMAC and return the digest; the handle stays allocated
    /// until `hmac_sha256_cleanup`
    fn hmac_sha256_final(&self, handle: Handle) -> Result<Vec<u8>, CallbackError>;

    /// Release the handle. `None` is a no-op.
    fn hmac_sha256_cleanup(&self, handle: Option<Handle>);
}

/// Mutual exclusion in the shape the engine calls it
pub trait Locking: Send + Sync {
    /// Must be reentrant for the calling thread
    fn lock(&self);

    fn unlock(&self);
}

enum HmacState {
    Running(hmac::Context),
    Finished,
}

/// Host crypto and locking for the protocol engine
pub struct CryptoBridge {
    lock: EngineLock,
    hmacs: Mutex<HandleTable<HmacState>>,
}

impl CryptoBridge {
    pub fn new() -> Self {
        Self {
            lock: EngineLock::new(),
            hmacs: Mutex::new(HandleTable::new()),
        }
    }

    /// The engine lock, for host code that must serialise with the engine
    pub fn engine_lock(&self) -> &EngineLock {
        &self.lock
    }

    /// Number of HMAC handles not yet cleaned up
    pub fn live_hmacs(&self) -> usize {
        self.hmacs.lock().len()
    }
}

impl Default for CryptoBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CryptoBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoBridge")
            .field("locked", &self.lock.is_locked())
            .field("live_hmacs", &self.live_hmacs())
            .finish()
    }
}

impl CryptoProvider for CryptoBridge {
    fn hmac_sha256_init(&self, key: &[u8]) -> Result<Handle, CallbackError> {
        let context = hmac::Context::with_key(&hmac::Key::new(hmac::HMAC_SHA256, key));
        let handle = self.hmacs.lock().insert(HmacState::Running(context))?;
        trace!(handle = handle.to_raw(), "hmac init");
        Ok(handle)
    }

    fn hmac_sha256_update(&self, handle: Handle, data: &[u8]) -> Result<(), CallbackError> {
        let mut hmacs = self.hmacs.lock();
        match hmacs.get_mut(handle) {
            Some(HmacState::Running(context)) => {
                context.update(data);
                Ok(())
            }
            Some(HmacState::Finished) => {
                warn!(handle = handle.to_raw(), "hmac update after final");
                Err(CallbackError::Computation)
            }
            None => {
                warn!(handle = handle.to_raw(), "hmac update on stale handle");
                Err(CallbackError::Computation)
            }
        }
    }

    fn hmac_sha256_final(&self, handle: Handle) -> Result<Vec<u8>, CallbackError> {
        let mut hmacs = self.hmacs.lock();
        let state = hmacs.get_mut(handle).ok_or_else(|| {
            warn!(handle = handle.to_raw(), "hmac final on stale handle");
            CallbackError::Unknown
        })?;

        match std::mem::replace(state, HmacState::Finished) {
            HmacState::Running(context) => Ok(context.sign().as_ref().to_vec()),
            HmacState::Finished => {
                warn!(handle = handle.to_raw(), "hmac finalized twice");
                Err(CallbackError::Unknown)
            }
        }
    }

    fn hmac_sha256_cleanup(&self, handle: Option<Handle>) {
        let Some(handle) = handle else {
            return;
        };
        if self.hmacs.lock().remove(handle).is_none() {
            warn!(handle = handle.to_raw(), "hmac cleanup on stale handle");
        } else {
            trace!(handle = handle.to_raw(), "hmac cleanup");
        }
    }
}

impl Locking for CryptoBridge {
    fn lock(&self) {
        self.lock.lock();
    }

    fn unlock(&self) {
        if let Err(e) = self.lock.unlock() {
            error!("engine unlock ignored: {}", e);
        }
    }
}
