//! Sigil - local identity store and protocol engine bridge
//!
//! Loads a messaging identity key pair from disk, unlocking it with a user
//! password when it is stored sealed, and supplies the host-side crypto and
//! locking callbacks a Signal-style protocol engine needs.
//!
//! - `crypto`: password key derivation and the sealed bundle format
//! - `store`: on-disk layout, unlock state machine, password prompt channel
//! - `engine`: callback tables, reentrant lock, HMAC handle table
//!
//! Secrets are zeroized on drop and never logged.

pub mod crypto;
pub mod engine;
pub mod store;
