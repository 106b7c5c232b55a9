use super::debounce::{Debouncer, Ticket};
use crate::api::MetadataSource;
use crate::notify::{ErrorChannel, ErrorKind};
use crate::registry::{Resolution, UrlRegistry, Validity};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Delays applied between an edit and its remote lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverTiming {
    /// Edit to `Pending` indicator
    pub pending_delay: Duration,
    /// Edit to remote call; must exceed `pending_delay`
    pub settle_delay: Duration,
}

impl Default for ResolverTiming {
    fn default() -> Self {
        Self {
            pending_delay: Duration::from_millis(300),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// Per-entry debounced metadata lookups
///
/// Each edit restarts the entry's timer; only the last edit inside the settle
/// window reaches the metadata source.
pub struct DebouncedResolver<S> {
    registry: Arc<RwLock<UrlRegistry>>,
    source: Arc<S>,
    timers: Debouncer<Uuid>,
    errors: ErrorChannel,
    timing: ResolverTiming,
}

impl<S> Clone for DebouncedResolver<S> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            source: Arc::clone(&self.source),
            timers: self.timers.clone(),
            errors: self.errors.clone(),
            timing: self.timing,
        }
    }
}

impl<S: MetadataSource> DebouncedResolver<S> {
    pub fn new(
        registry: Arc<RwLock<UrlRegistry>>,
        source: Arc<S>,
        errors: ErrorChannel,
        timing: ResolverTiming,
    ) -> Self {
        Self {
            registry,
            source,
            timers: Debouncer::new(),
            errors,
            timing,
        }
    }

    pub fn registry(&self) -> &Arc<RwLock<UrlRegistry>> {
        &self.registry
    }

    /// Edit an entry's link and (re)schedule or cancel its lookup
    pub async fn update_url(&self, id: Uuid, text: &str) -> Option<Validity> {
        let validity = self.registry.write().await.update_url(id, text)?;

        if validity == Validity::Valid {
            self.schedule(id, text.to_string());
        } else if self.timers.cancel(&id) {
            tracing::debug!("Cancelled pending lookup for entry {}", id);
        }

        Some(validity)
    }

    /// Look an entry up immediately, skipping the debounce delays
    pub async fn resolve_now(&self, id: Uuid) -> Option<Resolution> {
        self.timers.cancel(&id);

        let url = {
            let mut registry = self.registry.write().await;
            let entry = registry.get(id)?;
            if !entry.is_resolvable() {
                return Some(entry.resolution());
            }
            let url = entry.url().to_string();
            registry.mark_pending(id, &url);
            url
        };

        self.lookup(id, url, None).await;
        self.registry.read().await.get(id).map(|e| e.resolution())
    }

    /// Drop any scheduled lookup for `id`
    pub fn cancel(&self, id: Uuid) -> bool {
        self.timers.cancel(&id)
    }

    pub fn cancel_all(&self) {
        self.timers.cancel_all();
    }

    pub fn is_scheduled(&self, id: Uuid) -> bool {
        self.timers.is_scheduled(&id)
    }

    /// Wait until every scheduled lookup has finished
    pub async fn wait_idle(&self) {
        while self.timers.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    fn schedule(&self, id: Uuid, url: String) {
        let this = self.clone();
        let settle_rest = self
            .timing
            .settle_delay
            .saturating_sub(self.timing.pending_delay);

        tracing::trace!("Scheduling lookup for entry {}", id);
        self.timers
            .schedule(id, self.timing.pending_delay, move |ticket| async move {
                if ticket.is_current() {
                    this.registry.write().await.mark_pending(id, &url);
                }

                tokio::time::sleep(settle_rest).await;
                if !ticket.is_current() {
                    return;
                }

                this.lookup(id, url, Some(&ticket)).await;
            });
    }

    async fn lookup(&self, id: Uuid, url: String, ticket: Option<&Ticket<Uuid>>) {
        tracing::debug!("Resolving metadata for entry {}: {}", id, url);
        let result = self.source.video_metadata(url.trim()).await;

        if ticket.is_some_and(|t| !t.is_current()) {
            tracing::debug!("Discarding superseded lookup for entry {}", id);
            return;
        }

        let mut registry = self.registry.write().await;
        match result {
            Ok(metadata) => {
                let title = metadata.title.clone();
                if registry.apply_resolution(id, &url, Ok(metadata)) {
                    tracing::info!("Resolved entry {}: {}", id, title);
                }
            }
            Err(e) => {
                if registry.apply_resolution(id, &url, Err(())) {
                    drop(registry);
                    self.errors.raise(
                        ErrorKind::ResolutionFailed,
                        format!("Could not get information for {}: {}", url.trim(), e),
                    );
                }
            }
        }
    }
}
