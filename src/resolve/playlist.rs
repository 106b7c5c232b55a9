use super::debounce::{Debouncer, Ticket};
use crate::api::{MetadataSource, PlaylistMetadata};
use crate::notify::{ErrorChannel, ErrorKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub const PLAYLIST_ERROR_MESSAGE: &str = "Could not fetch playlist information. Check the URL.";

/// Playlist-mode view state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaylistState {
    pub source: String,
    pub loading: bool,
    pub metadata: Option<PlaylistMetadata>,
    pub active: bool,
}

/// Single-slot debounced playlist lookup
pub struct PlaylistResolver<S> {
    state: Arc<RwLock<PlaylistState>>,
    source: Arc<S>,
    timer: Debouncer<()>,
    errors: ErrorChannel,
    settle_delay: Duration,
}

impl<S> Clone for PlaylistResolver<S> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            source: Arc::clone(&self.source),
            timer: self.timer.clone(),
            errors: self.errors.clone(),
            settle_delay: self.settle_delay,
        }
    }
}

impl<S: MetadataSource> PlaylistResolver<S> {
    pub fn new(source: Arc<S>, errors: ErrorChannel, settle_delay: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(PlaylistState::default())),
            source,
            timer: Debouncer::new(),
            errors,
            settle_delay,
        }
    }

    pub async fn state(&self) -> PlaylistState {
        self.state.read().await.clone()
    }

    /// Playlist metadata, if the current source resolved
    pub async fn metadata(&self) -> Option<PlaylistMetadata> {
        self.state.read().await.metadata.clone()
    }

    /// Enter playlist mode and look up the current source
    pub async fn activate(&self) {
        let source = {
            let mut state = self.state.write().await;
            state.active = true;
            state.source.clone()
        };
        tracing::debug!("Playlist mode entered");
        if !source.trim().is_empty() {
            self.schedule(source);
        }
    }

    /// Leave playlist mode, dropping any pending lookup and the current result
    pub async fn deactivate(&self) {
        self.timer.cancel(&());
        let mut state = self.state.write().await;
        state.active = false;
        state.loading = false;
        state.metadata = None;
        tracing::debug!("Playlist mode left");
    }

    /// Edit the playlist link
    pub async fn set_source(&self, text: &str) {
        let active = {
            let mut state = self.state.write().await;
            state.source = text.to_string();
            if text.trim().is_empty() {
                state.metadata = None;
                state.loading = false;
            }
            state.active
        };

        if text.trim().is_empty() {
            self.timer.cancel(&());
        } else if active {
            self.schedule(text.to_string());
        }
    }

    /// Look the current source up immediately; does nothing while inactive
    pub async fn resolve_now(&self) -> Option<PlaylistMetadata> {
        self.timer.cancel(&());
        let (source, active) = {
            let state = self.state.read().await;
            (state.source.clone(), state.active)
        };
        if !active || source.trim().is_empty() {
            return None;
        }
        self.fetch(source, None).await;
        self.metadata().await
    }

    /// Wait for a scheduled lookup to finish
    pub async fn wait_idle(&self) {
        while self.timer.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.timer.is_scheduled(&())
    }

    fn schedule(&self, source: String) {
        let this = self.clone();
        self.timer.schedule((), self.settle_delay, move |ticket| async move {
            if ticket.is_current() {
                this.fetch(source, Some(&ticket)).await;
            }
        });
    }

    async fn fetch(&self, source: String, ticket: Option<&Ticket<()>>) {
        {
            let mut state = self.state.write().await;
            state.metadata = None;
            state.loading = true;
        }

        tracing::debug!("Resolving playlist {}", source);
        let result = self.source.playlist_metadata(source.trim()).await;

        if ticket.is_some_and(|t| !t.is_current()) {
            tracing::debug!("Discarding superseded playlist lookup for {}", source);
            return;
        }

        let mut state = self.state.write().await;
        if !state.active || state.source != source {
            tracing::debug!("Discarding playlist lookup for {}", source);
            return;
        }
        state.loading = false;
        match result {
            Ok(metadata) => {
                tracing::info!(
                    "Resolved playlist {:?} with {} items",
                    metadata.title,
                    metadata.expected_items()
                );
                state.metadata = Some(metadata);
            }
            Err(e) => {
                state.metadata = None;
                drop(state);
                tracing::debug!("Playlist lookup failed for {}: {}", source, e);
                self.errors
                    .raise(ErrorKind::ResolutionFailed, PLAYLIST_ERROR_MESSAGE);
            }
        }
    }
}
