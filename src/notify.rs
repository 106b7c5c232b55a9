//! User-facing error channel
//!
//! Holds the single visible error message. A raised error replaces the
//! previous one and disappears on its own after a fixed duration unless it is
//! dismissed earlier.

use crate::resolve::debounce::Debouncer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// Error taxonomy surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Link failed the local format check
    FormatInvalid,
    /// Remote metadata lookup failed for one entry or the playlist
    ResolutionFailed,
    /// Conversion request answered with a non-success status
    DispatchRejected,
    /// Push channel closed and did not come back within the grace window
    StreamLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserError {
    pub id: u64,
    pub kind: ErrorKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ErrorChannel {
    current: Arc<Mutex<Option<UserError>>>,
    events: broadcast::Sender<UserError>,
    dismiss_timer: Debouncer<()>,
    dismiss_after: Duration,
    next_id: Arc<AtomicU64>,
}

impl ErrorChannel {
    pub fn new(dismiss_after: Duration) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            current: Arc::new(Mutex::new(None)),
            events,
            dismiss_timer: Debouncer::new(),
            dismiss_after,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Show `message`, replacing any visible error, and start its dismissal timer
    pub fn raise(&self, kind: ErrorKind, message: impl Into<String>) -> UserError {
        let error = UserError {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            message: message.into(),
            raised_at: Utc::now(),
        };

        match kind {
            ErrorKind::DispatchRejected | ErrorKind::StreamLost => {
                tracing::error!(kind = ?kind, "{}", error.message)
            }
            _ => tracing::warn!(kind = ?kind, "{}", error.message),
        }

        *self.lock() = Some(error.clone());
        // Nobody listening is fine; the error stays readable through `current`
        let _ = self.events.send(error.clone());

        let current = Arc::clone(&self.current);
        let id = error.id;
        self.dismiss_timer.schedule((), self.dismiss_after, move |ticket| async move {
            if !ticket.is_current() {
                return;
            }
            let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
            if current.as_ref().is_some_and(|e| e.id == id) {
                tracing::trace!("Auto-dismissed error {}", id);
                *current = None;
            }
        });

        error
    }

    /// Hide the visible error now
    pub fn dismiss(&self) {
        self.dismiss_timer.cancel(&());
        *self.lock() = None;
    }

    pub fn current(&self) -> Option<UserError> {
        self.lock().clone()
    }

    /// Receive every error raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<UserError> {
        self.events.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<UserError>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ErrorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("current", &self.current())
            .field("dismiss_after", &self.dismiss_after)
            .finish()
    }
}
