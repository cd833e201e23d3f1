//! Password request/response channel
//!
//! The store never talks to a UI directly. It issues a `PasswordRequested`
//! through a `PasswordPrompt` and receives each answer as a
//! `PasswordSubmitted` on a bounded channel of capacity one, so the host can
//! have at most one attempt in flight.
//!
//! ```text
//! IdentityStore ── PasswordRequested ──► host UI
//!       ▲                                   │
//!       └──────── PasswordSubmitted ────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::debug;
use zeroize::Zeroizing;

use super::identity::{IdentityStore, StoreError, StoreEvent, StoreState};

/// Host collaborator that can show a password prompt
pub trait PasswordPrompt {
    /// Ask the host to present a password prompt to the user
    fn prompt_password(&self);
}

/// Request for the host to collect a password
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordRequested {
    /// 1 for the first prompt, incremented on every re-prompt
    pub attempt: u32,
}

impl PasswordRequested {
    /// Whether a previous attempt failed
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}

/// Password entered by the user; zeroized on drop
pub struct PasswordSubmitted(Zeroizing<String>);

impl PasswordSubmitted {
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordSubmitted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordSubmitted(<redacted>)")
    }
}

/// `PasswordPrompt` that forwards requests over a channel
#[derive(Debug)]
pub struct ChannelPrompt {
    requests: mpsc::UnboundedSender<PasswordRequested>,
    attempts: AtomicU32,
}

impl PasswordPrompt for ChannelPrompt {
    fn prompt_password(&self) {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if self.requests.send(PasswordRequested { attempt }).is_err() {
            debug!(attempt, "password request dropped: host is gone");
        }
    }
}

/// Create a prompt and the receiver the host listens on
pub fn prompt_channel() -> (ChannelPrompt, mpsc::UnboundedReceiver<PasswordRequested>) {
    let (requests, receiver) = mpsc::unbounded_channel();
    let prompt = ChannelPrompt {
        requests,
        attempts: AtomicU32::new(0),
    };
    (prompt, receiver)
}

/// Create the single-slot channel carrying password submissions
pub fn submission_channel() -> (
    mpsc::Sender<PasswordSubmitted>,
    mpsc::Receiver<PasswordSubmitted>,
) {
    mpsc::channel(1)
}

/// Errors that end the unlock flow
#[derive(Debug, Error)]
pub enum UnlockError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Password prompt closed before the identity was unlocked")]
    PromptClosed,

    #[error("Unlock worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Drive a store from `Unloaded` to `Ready`.
///
/// Loads the identity, then answers every `PasswordSubmitted` by running the
/// key derivation and decryption on a blocking worker. Emits a `StoreEvent`
/// per attempt and re-prompts after each `DecryptionFailure`.
///
/// Returns the unlocked store, or the first fatal error. Dropping the
/// submission sender ends the flow with `UnlockError::PromptClosed`.
pub async fn unlock<P: PasswordPrompt>(
    mut store: IdentityStore,
    prompt: &P,
    mut submissions: mpsc::Receiver<PasswordSubmitted>,
    events: &mpsc::UnboundedSender<StoreEvent>,
) -> Result<IdentityStore, UnlockError> {
    if store.load_identity(prompt)? == StoreState::Ready {
        emit(events, StoreEvent::Ready);
        return Ok(store);
    }

    loop {
        let submitted = submissions.recv().await.ok_or(UnlockError::PromptClosed)?;

        let (returned, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = store.supply_password(submitted.expose());
            (store, outcome)
        })
        .await?;
        store = returned;

        let event = outcome?;
        emit(events, event);

        match event {
            StoreEvent::Ready => return Ok(store),
            StoreEvent::DecryptionFailure => prompt.prompt_password(),
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<StoreEvent>, event: StoreEvent) {
    if events.send(event).is_err() {
        debug!(?event, "store event dropped: no listener");
    }
}
