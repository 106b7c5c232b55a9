//! Single entry point tying the registry, resolvers and dispatcher together

use super::config::Config;
use crate::api::ApiClient;
use crate::conversion::{
    ConversionDispatcher, ConversionError, ConversionMode, ConversionResult, ConversionSession,
    OutputFormat, SubmitRequest,
};
use crate::notify::{ErrorChannel, UserError};
use crate::persistence::LocalStore;
use crate::registry::{UrlEntry, UrlRegistry, Validity};
use crate::resolve::{DebouncedResolver, PlaylistResolver, PlaylistState};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selection {
    mode: ConversionMode,
    format: OutputFormat,
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<RwLock<UrlRegistry>>,
    resolver: DebouncedResolver<ApiClient>,
    playlist: PlaylistResolver<ApiClient>,
    dispatcher: ConversionDispatcher,
    errors: ErrorChannel,
    selection: Arc<RwLock<Selection>>,
}

impl Orchestrator {
    /// Build every component from `config`, restoring entries from `store` if given
    pub fn new(config: &Config, store: Option<LocalStore>) -> anyhow::Result<Self> {
        let client = ApiClient::new(&config.api).context("Failed to create API client")?;
        let source = Arc::new(client.clone());
        let errors = ErrorChannel::new(config.dismiss_after());

        let registry = match store {
            Some(store) => UrlRegistry::load(store),
            None => UrlRegistry::new(),
        };
        let registry = Arc::new(RwLock::new(registry));

        Ok(Self {
            resolver: DebouncedResolver::new(
                Arc::clone(&registry),
                Arc::clone(&source),
                errors.clone(),
                config.resolver_timing(),
            ),
            playlist: PlaylistResolver::new(
                source,
                errors.clone(),
                config.playlist_settle_delay(),
            ),
            dispatcher: ConversionDispatcher::new(
                client,
                errors.clone(),
                config.dispatcher_settings(),
            ),
            registry,
            errors,
            selection: Arc::new(RwLock::new(Selection {
                mode: ConversionMode::Individual,
                format: config.output.default_format,
            })),
        })
    }

    pub fn resolver(&self) -> &DebouncedResolver<ApiClient> {
        &self.resolver
    }

    pub fn playlist_resolver(&self) -> &PlaylistResolver<ApiClient> {
        &self.playlist
    }

    pub fn dispatcher(&self) -> &ConversionDispatcher {
        &self.dispatcher
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    pub async fn add_entry(&self) -> Uuid {
        self.registry.write().await.add_entry()
    }

    pub async fn remove_entry(&self, id: Uuid) -> bool {
        let removed = self.registry.write().await.remove_entry(id);
        if removed {
            self.resolver.cancel(id);
        }
        removed
    }

    pub async fn update_url(&self, id: Uuid, text: &str) -> Option<Validity> {
        self.resolver.update_url(id, text).await
    }

    pub async fn clear_all_but_first(&self) {
        let removed = self.registry.write().await.clear_all_but_first();
        for id in removed {
            self.resolver.cancel(id);
        }
    }

    pub async fn mode(&self) -> ConversionMode {
        self.selection.read().await.mode
    }

    /// Switch between individual links and playlist conversion
    pub async fn set_mode(&self, mode: ConversionMode) {
        let previous = std::mem::replace(&mut self.selection.write().await.mode, mode);
        if previous == mode {
            return;
        }

        match mode {
            ConversionMode::Playlist => self.playlist.activate().await,
            ConversionMode::Individual => self.playlist.deactivate().await,
        }
    }

    pub async fn set_playlist_source(&self, text: &str) {
        self.playlist.set_source(text).await;
    }

    pub async fn format(&self) -> OutputFormat {
        self.selection.read().await.format
    }

    pub async fn set_format(&self, format: OutputFormat) {
        self.selection.write().await.format = format;
    }

    /// Whether `submit` would start a conversion right now
    pub async fn can_convert(&self) -> bool {
        if self.dispatcher.current().is_some_and(|s| s.is_running()) {
            return false;
        }

        match self.mode().await {
            ConversionMode::Individual => self.registry.read().await.ready_count() > 0,
            ConversionMode::Playlist => self
                .playlist
                .metadata()
                .await
                .is_some_and(|m| !m.item_urls.is_empty()),
        }
    }

    /// Convert the current selection and save the result
    pub async fn submit(&self) -> ConversionResult<ConversionSession> {
        let Selection { mode, format } = *self.selection.read().await;

        let request = match mode {
            ConversionMode::Individual => {
                let urls = self.registry.read().await.resolved_urls();
                SubmitRequest::individual(urls, format)
            }
            ConversionMode::Playlist => match self.playlist.metadata().await {
                Some(metadata) => SubmitRequest::playlist(&metadata, format),
                None => return Err(ConversionError::NothingToConvert("playlist not resolved")),
            },
        };

        self.dispatcher.submit(request).await
    }

    pub fn cancel(&self) -> bool {
        self.dispatcher.cancel()
    }

    /// Close the progress panel
    pub fn dismiss_progress(&self) {
        self.dispatcher.dismiss();
    }

    pub async fn entries(&self) -> Vec<UrlEntry> {
        self.registry.read().await.entries().to_vec()
    }

    pub async fn playlist(&self) -> PlaylistState {
        self.playlist.state().await
    }

    pub fn session(&self) -> Option<ConversionSession> {
        self.dispatcher.current()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<Option<ConversionSession>> {
        self.dispatcher.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<UserError> {
        self.errors.subscribe()
    }
}
