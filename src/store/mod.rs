//! Locally persisted identity store
//!
//! Loads the identity key bundle from `<data-dir>/storage/identity/identity_key`,
//! unlocks it with a user password when it is sealed, and hands the plain
//! bundle to the protocol engine.

pub mod identity;
pub mod paths;
pub mod prompt;

pub use identity::{
    probe_identity, seal_identity, IdentityBundle, IdentityKeyPair, IdentityStore, StoreError,
    StoreEvent, StoreState,
};
pub use paths::{default_data_dir, StoragePaths};
pub use prompt::{
    prompt_channel, submission_channel, unlock, ChannelPrompt, PasswordPrompt, PasswordRequested,
    PasswordSubmitted, UnlockError,
};
