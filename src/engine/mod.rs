//! Protocol engine bridge
//!
//! The engine is an external library that expects its host to supply an
//! HMAC-SHA256 implementation and a reentrant lock through C callback tables.
//!
//! ```text
//! ┌────────────────────┐  CryptoProviderTable  ┌───────────────┐
//! │  ProtocolEngine    │ ────────────────────► │  CryptoBridge │
//! │  (foreign, C ABI)  │  LockingTable         │  EngineLock   │
//! │                    │ ────────────────────► │  HandleTable  │
//! └────────────────────┘                       └───────────────┘
//!            ▲                                        ▲
//!            └──────────── EngineContext ─────────────┘
//! ```
//!
//! `EngineContext` owns both halves and fixes their teardown order.

pub mod bridge;
pub mod context;
pub mod ffi;
pub mod handles;
pub mod lock;
pub mod mock;

pub use bridge::{CallbackError, CryptoBridge, CryptoProvider, Locking};
pub use context::{ContextError, EngineContext, ProtocolEngine};
pub use ffi::{sigil_digest_buffer_free, CryptoProviderTable, DigestBuffer, LockingTable};
pub use handles::{Handle, HandleError, HandleTable};
pub use lock::{EngineLock, LockError};
pub use mock::{MockEngine, MockEngineError};
