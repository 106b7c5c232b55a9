//! Conversion sessions
//!
//! At most one session is active. Submitting retires the previous session and
//! its progress channel; a response that arrives for a retired session is
//! discarded.

use super::download;
use super::error::{ConversionError, ConversionResult};
use super::format::OutputFormat;
use super::session::{ConversionMode, ConversionSession, SessionState};
use super::stream::{ChannelState, ProgressStream, StreamEvent, StreamSettings};
use crate::api::{ApiClient, PlaylistMetadata};
use crate::notify::{ErrorChannel, ErrorKind};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

pub const STREAM_LOST_MESSAGE: &str = "Connection to the server was lost during conversion.";

/// What to convert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub mode: ConversionMode,
    pub format: OutputFormat,
    pub urls: Vec<String>,
    pub total_expected: usize,
}

impl SubmitRequest {
    /// Batch of resolved links
    pub fn individual(urls: Vec<String>, format: OutputFormat) -> Self {
        Self {
            mode: ConversionMode::Individual,
            format,
            total_expected: urls.len(),
            urls,
        }
    }

    /// Every item of a resolved playlist
    pub fn playlist(metadata: &PlaylistMetadata, format: OutputFormat) -> Self {
        Self {
            mode: ConversionMode::Playlist,
            format,
            urls: metadata.item_urls.clone(),
            total_expected: metadata.expected_items(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    pub output_dir: PathBuf,
    pub grace_period: Duration,
    pub close_delay: Duration,
    pub stream: StreamSettings,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            grace_period: Duration::from_millis(3000),
            close_delay: Duration::from_millis(2000),
            stream: StreamSettings::default(),
        }
    }
}

/// Resources tied to the active session
#[derive(Default)]
struct SessionSlot {
    session_id: Option<Uuid>,
    stream: Option<ProgressStream>,
    driver: Option<JoinHandle<()>>,
    closer: Option<JoinHandle<()>>,
}

impl SessionSlot {
    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }

    /// Release everything held for the current session
    fn retire(&mut self) {
        self.close_stream();
        if let Some(closer) = self.closer.take() {
            closer.abort();
        }
        self.session_id = None;
    }

    fn holds(&self, id: Uuid) -> bool {
        self.session_id == Some(id)
    }
}

#[derive(Clone)]
pub struct ConversionDispatcher {
    client: ApiClient,
    sessions: watch::Sender<Option<ConversionSession>>,
    slot: Arc<Mutex<SessionSlot>>,
    errors: ErrorChannel,
    settings: DispatcherSettings,
}

impl ConversionDispatcher {
    pub fn new(client: ApiClient, errors: ErrorChannel, settings: DispatcherSettings) -> Self {
        let (sessions, _) = watch::channel(None);
        Self {
            client,
            sessions,
            slot: Arc::new(Mutex::new(SessionSlot::default())),
            errors,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    /// Snapshot of the active session
    pub fn current(&self) -> Option<ConversionSession> {
        self.sessions.borrow().clone()
    }

    /// Live session snapshots for rendering progress
    pub fn subscribe(&self) -> watch::Receiver<Option<ConversionSession>> {
        self.sessions.subscribe()
    }

    /// Run one conversion to completion
    ///
    /// Returns the finished session. A session that was cancelled or replaced
    /// while its request was in flight yields [`ConversionError::Superseded`].
    pub async fn submit(&self, request: SubmitRequest) -> ConversionResult<ConversionSession> {
        if request.urls.is_empty() {
            return Err(ConversionError::NothingToConvert(match request.mode {
                ConversionMode::Individual => "no resolved links",
                ConversionMode::Playlist => "playlist has no items",
            }));
        }

        let session =
            ConversionSession::start(request.mode, request.format, request.total_expected);
        let id = session.id;
        tracing::info!(
            "Starting {:?} conversion {} of {} link(s) to {}",
            request.mode,
            id,
            request.urls.len(),
            request.format
        );

        {
            let mut slot = self.lock_slot();
            slot.retire();
            self.sessions.send_modify(|current| {
                if let Some(previous) = current {
                    previous.cancel();
                }
                *current = Some(session);
            });
            slot.session_id = Some(id);

            if request.mode == ConversionMode::Playlist {
                let (stream, events) =
                    ProgressStream::connect(self.client.clone(), self.settings.stream);
                slot.driver = Some(tokio::spawn(drive_session(
                    id,
                    events,
                    stream.watch_state(),
                    self.sessions.clone(),
                    self.errors.clone(),
                    self.settings.grace_period,
                )));
                slot.stream = Some(stream);
            }
        }

        let response = self.client.convert(&request.urls, request.format).await;
        if !self.is_running(id) {
            tracing::debug!("Discarding response for retired conversion {}", id);
            return Err(self.retired_error(id));
        }

        let result = match response {
            Ok(response) => {
                download::save_response(
                    response,
                    &self.settings.output_dir,
                    request.format,
                    request.urls.len(),
                    self.retired(id),
                )
                .await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(saved) => {
                let path = saved.path.clone();
                if !self.update(id, |s| s.complete(Some(saved))) {
                    tracing::debug!("Conversion {} retired while saving {:?}", id, path);
                    download::remove_partial(&path).await;
                    return Err(self.retired_error(id));
                }
                self.schedule_close(id);
            }
            Err(ConversionError::Superseded) => {
                tracing::debug!("Conversion {} retired during download", id);
                return Err(self.retired_error(id));
            }
            Err(e) => {
                let message = e.to_string();
                if self.update(id, |s| s.fail(message.as_str())) {
                    self.errors.raise(ErrorKind::DispatchRejected, message);
                }
                let mut slot = self.lock_slot();
                if slot.holds(id) {
                    slot.close_stream();
                }
                return Err(e);
            }
        }

        self.sessions
            .borrow()
            .clone()
            .filter(|s| s.id == id)
            .ok_or(ConversionError::Superseded)
    }

    /// Stop the active session; its pending response is ignored when it arrives
    pub fn cancel(&self) -> bool {
        let mut slot = self.lock_slot();
        slot.close_stream();
        let cancelled = self.sessions.send_if_modified(|current| match current {
            Some(session) if session.is_running() => {
                session.cancel();
                true
            }
            _ => false,
        });
        if cancelled {
            tracing::info!("Conversion cancelled");
        }
        cancelled
    }

    /// Clear the session from the slot, cancelling it if still running
    pub fn dismiss(&self) {
        self.cancel();
        self.lock_slot().retire();
        self.sessions.send_replace(None);
    }

    /// Whether a progress channel is held for the active session
    pub fn has_open_stream(&self) -> bool {
        self.lock_slot().stream.is_some()
    }

    /// Resolves once session `id` is no longer the running one
    fn retired(&self, id: Uuid) -> impl Future<Output = ()> + Send {
        let mut sessions = self.sessions.subscribe();
        async move {
            let _ = sessions
                .wait_for(|current| !current.as_ref().is_some_and(|s| s.id == id && s.is_running()))
                .await;
        }
    }

    /// Why session `id` stopped before its result could be kept
    fn retired_error(&self, id: Uuid) -> ConversionError {
        let lost = self
            .sessions
            .borrow()
            .as_ref()
            .is_some_and(|s| s.id == id && s.state == SessionState::Failed);
        if lost {
            ConversionError::StreamLost
        } else {
            ConversionError::Superseded
        }
    }

    fn is_running(&self, id: Uuid) -> bool {
        self.sessions
            .borrow()
            .as_ref()
            .is_some_and(|s| s.id == id && s.is_running())
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut ConversionSession)) -> bool {
        self.sessions.send_if_modified(|current| match current {
            Some(session) if session.id == id => {
                let before = session.state;
                apply(session);
                session.state != before
            }
            _ => false,
        })
    }

    /// Close the channel shortly after success so trailing events still land
    fn schedule_close(&self, id: Uuid) {
        let slot = Arc::clone(&self.slot);
        let delay = self.settings.close_delay;
        let closer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.holds(id) {
                slot.close_stream();
            }
        });

        let mut slot = self.lock_slot();
        if slot.holds(id) {
            if let Some(previous) = slot.closer.replace(closer) {
                previous.abort();
            }
        } else {
            closer.abort();
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Apply channel events to session `session_id`
///
/// A channel error only fails the session if, after `grace_period`, the
/// channel is closed and the session is still running.
pub(crate) async fn drive_session(
    session_id: Uuid,
    mut events: mpsc::UnboundedReceiver<StreamEvent>,
    channel: watch::Receiver<ChannelState>,
    sessions: watch::Sender<Option<ConversionSession>>,
    errors: ErrorChannel,
    grace_period: Duration,
) {
    let mut deadline: Option<Instant> = None;
    let mut events_done = false;

    loop {
        let wake_at = deadline;
        let grace = async move {
            match wake_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            event = events.recv(), if !events_done => match event {
                Some(StreamEvent::ItemCompleted { filename }) => {
                    sessions.send_if_modified(|current| match current {
                        Some(session) if session.id == session_id => {
                            session.record_completed(filename)
                        }
                        _ => false,
                    });
                }
                Some(StreamEvent::StreamError { .. }) | Some(StreamEvent::StreamClosed) => {
                    deadline.get_or_insert_with(|| Instant::now() + grace_period);
                }
                None => {
                    events_done = true;
                    if deadline.is_none() {
                        return;
                    }
                }
            },
            _ = grace => {
                deadline = None;
                let closed = *channel.borrow() == ChannelState::Closed;
                let failed = closed && sessions.send_if_modified(|current| match current {
                    Some(session) if session.id == session_id && session.is_running() => {
                        session.fail(STREAM_LOST_MESSAGE);
                        true
                    }
                    _ => false,
                });

                if failed {
                    errors.raise(ErrorKind::StreamLost, STREAM_LOST_MESSAGE);
                    return;
                }
                if events_done {
                    return;
                }
                tracing::debug!("Progress channel recovered within grace period");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        events: mpsc::UnboundedSender<StreamEvent>,
        channel: watch::Sender<ChannelState>,
        sessions: watch::Sender<Option<ConversionSession>>,
        errors: ErrorChannel,
        session_id: Uuid,
    }

    fn start_driver(total: usize) -> Harness {
        let session = ConversionSession::start(ConversionMode::Playlist, OutputFormat::Mp3, total);
        let session_id = session.id;
        let (sessions, _) = watch::channel(Some(session));
        let (events, events_rx) = mpsc::unbounded_channel();
        let (channel, channel_rx) = watch::channel(ChannelState::Open);
        let errors = ErrorChannel::new(Duration::from_secs(5));

        tokio::spawn(drive_session(
            session_id,
            events_rx,
            channel_rx,
            sessions.clone(),
            errors.clone(),
            Duration::from_secs(3),
        ));

        Harness {
            events,
            channel,
            sessions,
            errors,
            session_id,
        }
    }

    fn snapshot(harness: &Harness) -> ConversionSession {
        harness.sessions.borrow().clone().unwrap()
    }

    fn completed(name: &str) -> StreamEvent {
        StreamEvent::ItemCompleted {
            filename: name.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_items_accumulate() {
        let harness = start_driver(5);
        for name in ["a.mp3", "b.mp3", "c.mp3"] {
            harness.events.send(completed(name)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let session = snapshot(&harness);
        assert_eq!(session.completed_items.len(), 3);
        assert_eq!(session.remaining(), 2);
        assert_eq!(session.completed_items[2].filename, "c.mp3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_within_grace_is_not_fatal() {
        let harness = start_driver(2);
        harness.channel.send_replace(ChannelState::ErrorPending);
        harness
            .events
            .send(StreamEvent::StreamError {
                message: "reset".to_string(),
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        harness.channel.send_replace(ChannelState::Open);
        harness.events.send(completed("a.mp3")).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let session = snapshot(&harness);
        assert_eq!(session.state, SessionState::Running);
        assert_eq!(session.completed_items.len(), 1);
        assert!(harness.errors.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_after_grace_fails_session() {
        let harness = start_driver(2);
        harness.channel.send_replace(ChannelState::Closed);
        harness.events.send(StreamEvent::StreamClosed).unwrap();

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(snapshot(&harness).state, SessionState::Running);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let session = snapshot(&harness);
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.error.as_deref(), Some(STREAM_LOST_MESSAGE));

        let error = harness.errors.current().unwrap();
        assert_eq!(error.kind, ErrorKind::StreamLost);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_session_is_not_failed_by_closed_channel() {
        let harness = start_driver(1);
        harness.sessions.send_modify(|s| {
            if let Some(session) = s {
                session.complete(None);
            }
        });
        harness.channel.send_replace(ChannelState::Closed);
        harness.events.send(StreamEvent::StreamClosed).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(snapshot(&harness).state, SessionState::Completed);
        assert!(harness.errors.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_replaced_session_are_dropped() {
        let harness = start_driver(3);
        let replacement = ConversionSession::start(ConversionMode::Playlist, OutputFormat::Mp3, 3);
        let replacement_id = replacement.id;
        harness.sessions.send_replace(Some(replacement));

        harness.events.send(completed("late.mp3")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let session = snapshot(&harness);
        assert_eq!(session.id, replacement_id);
        assert_ne!(session.id, harness.session_id);
        assert!(session.completed_items.is_empty());
    }

    #[tokio::test]
    async fn test_empty_request_creates_no_session() {
        let client = ApiClient::with_base_url("http://127.0.0.1:9").unwrap();
        let dispatcher = ConversionDispatcher::new(
            client,
            ErrorChannel::new(Duration::from_secs(5)),
            DispatcherSettings::default(),
        );

        let result = dispatcher
            .submit(SubmitRequest::individual(Vec::new(), OutputFormat::Mp3))
            .await;
        assert!(matches!(result, Err(ConversionError::NothingToConvert(_))));
        assert!(dispatcher.current().is_none());
    }
}
