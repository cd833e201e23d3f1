//! Explicit engine context
//!
//! Owns the protocol engine together with the bridge its callbacks point
//! into. The bridge is boxed so its address is stable for the lifetime of
//! the context, and the engine is dropped before the bridge.

use std::error::Error;

use thiserror::Error;
use tracing::{debug, info};

use super::bridge::CryptoBridge;
use super::ffi::{CryptoProviderTable, LockingTable};
use crate::store::{IdentityKeyPair, IdentityStore, StoreState};

type BoxError = Box<dyn Error + Send + Sync>;

/// The foreign protocol engine, as seen by the host
///
/// The HMAC final callback hands out a [`DigestBuffer`] (`{ len, data }`,
/// data allocated by this crate) that must be released with
/// `sigil_digest_buffer_free`. An engine with its own buffer type, such as
/// libsignal-protocol-c's inline-data `signal_buffer`, does not share that
/// layout or allocator: its binding must copy the digest into a buffer
/// allocated by the engine and free the `DigestBuffer` straight away.
///
/// [`DigestBuffer`]: super::ffi::DigestBuffer
pub trait ProtocolEngine {
    type Error: Error + Send + Sync + 'static;

    fn set_crypto_provider(&mut self, provider: CryptoProviderTable) -> Result<(), Self::Error>;

    fn set_locking_functions(&mut self, locking: LockingTable) -> Result<(), Self::Error>;

    /// Hand over the unlocked identity key pair
    fn load_identity_key_pair(&mut self, identity: IdentityKeyPair<'_>) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Engine rejected crypto provider: {0}")]
    CryptoProvider(#[source] BoxError),

    #[error("Engine rejected locking functions: {0}")]
    Locking(#[source] BoxError),

    #[error("Identity store is not ready (state: {0:?})")]
    IdentityNotReady(StoreState),

    #[error("Engine rejected identity key pair: {0}")]
    Identity(#[source] BoxError),
}

/// A protocol engine with the host bridge registered
pub struct EngineContext<E: ProtocolEngine> {
    // Field order is drop order: engine first, then the bridge it calls into
    engine: E,
    bridge: Box<CryptoBridge>,
}

impl<E: ProtocolEngine> EngineContext<E> {
    /// Register a fresh bridge with `engine`
    pub fn new(mut engine: E) -> Result<Self, ContextError> {
        let bridge = Box::new(CryptoBridge::new());

        // SAFETY: the bridge lives on the heap and is owned by the returned
        // context, which drops the engine first. On the error paths the
        // engine is dropped explicitly before the bridge.
        let provider = unsafe { CryptoProviderTable::for_provider(&*bridge) };
        let locking = unsafe { LockingTable::for_locking(&*bridge) };

        if let Err(e) = engine.set_crypto_provider(provider) {
            drop(engine);
            return Err(ContextError::CryptoProvider(Box::new(e)));
        }
        if let Err(e) = engine.set_locking_functions(locking) {
            drop(engine);
            return Err(ContextError::Locking(Box::new(e)));
        }

        debug!("Protocol engine context opened");
        Ok(Self { engine, bridge })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn bridge(&self) -> &CryptoBridge {
        &self.bridge
    }

    /// Pass the store's plain identity to the engine under the engine lock
    pub fn install_identity(&mut self, store: &IdentityStore) -> Result<String, ContextError> {
        let identity = store
            .identity()
            .ok_or(ContextError::IdentityNotReady(store.state()))?;
        let fingerprint = identity.fingerprint();

        let _guard = self.bridge.engine_lock().hold();
        self.engine
            .load_identity_key_pair(identity)
            .map_err(|e| ContextError::Identity(Box::new(e)))?;

        info!(fingerprint = %fingerprint, "Identity installed in protocol engine");
        Ok(fingerprint)
    }
}

impl<E: ProtocolEngine> Drop for EngineContext<E> {
    fn drop(&mut self) {
        debug!(
            live_hmacs = self.bridge.live_hmacs(),
            "Protocol engine context closed"
        );
    }
}

impl<E: ProtocolEngine + std::fmt::Debug> std::fmt::Debug for EngineContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("engine", &self.engine)
            .field("bridge", &self.bridge)
            .finish()
    }
}
