//! Server-push progress channel
//!
//! A background task holds the `/events` connection, parses its
//! `text/event-stream` body and publishes [`StreamEvent`]s. The connection
//! state is published separately on a `watch` channel so consumers can check
//! whether the channel recovered after an error.

use crate::api::models::ProgressFrame;
use crate::api::{ApiClient, ApiError};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
    /// Errored and waiting to reconnect
    ErrorPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ItemCompleted { filename: String },
    StreamError { message: String },
    /// The channel gave up and will not reconnect
    StreamClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(1000),
            max_reconnect_attempts: 3,
        }
    }
}

/// Handle to a running progress channel
///
/// Dropping the handle closes the channel.
#[derive(Debug)]
pub struct ProgressStream {
    state_tx: watch::Sender<ChannelState>,
    task: Option<JoinHandle<()>>,
}

impl ProgressStream {
    /// Open the channel and start publishing events
    pub fn connect(
        client: ApiClient,
        settings: StreamSettings,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (state_tx, _) = watch::channel(ChannelState::Connecting);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_channel(
            client,
            settings,
            state_tx.clone(),
            events_tx,
        ));

        (
            Self {
                state_tx,
                task: Some(task),
            },
            events_rx,
        )
    }

    pub fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Stop the channel; calling it again does nothing
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.state_tx.send_replace(ChannelState::Closed);
            tracing::debug!("Progress channel closed");
        }
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_channel(
    client: ApiClient,
    settings: StreamSettings,
    state: watch::Sender<ChannelState>,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    let mut failures = 0u32;

    loop {
        state.send_replace(ChannelState::Connecting);

        let message = match client.open_events().await {
            Ok(response) if !is_event_stream(&response) => {
                tracing::warn!(
                    "Progress channel answered with content type {:?}",
                    response.headers().get(CONTENT_TYPE)
                );
                break;
            }
            Ok(response) => {
                state.send_replace(ChannelState::Open);
                failures = 0;
                tracing::debug!("Progress channel open");

                match read_events(response, &events).await {
                    Ok(()) => "event stream ended".to_string(),
                    Err(e) => e.to_string(),
                }
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!("Progress channel rejected: {}", e);
                break;
            }
            Err(e) => e.to_string(),
        };

        state.send_replace(ChannelState::ErrorPending);
        tracing::warn!("Progress channel error: {}", message);
        if events.send(StreamEvent::StreamError { message }).is_err() {
            break;
        }

        failures += 1;
        if failures > settings.max_reconnect_attempts {
            tracing::warn!("Progress channel gave up after {} attempts", failures);
            break;
        }
        tokio::time::sleep(settings.reconnect_delay).await;
    }

    state.send_replace(ChannelState::Closed);
    let _ = events.send(StreamEvent::StreamClosed);
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("text/event-stream"))
}

async fn read_events(
    response: reqwest::Response,
    events: &mpsc::UnboundedSender<StreamEvent>,
) -> Result<(), ApiError> {
    let mut parser = SseParser::default();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        for payload in parser.feed(&chunk?) {
            if let Some(event) = frame_event(&payload) {
                if events.send(event).is_err() {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Map one `data` payload to an event; anything but a completed item is dropped
fn frame_event(payload: &str) -> Option<StreamEvent> {
    let frame: ProgressFrame = match serde_json::from_str(payload) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Ignoring malformed progress frame {:?}: {}", payload, e);
            return None;
        }
    };

    match (frame.kind.as_str(), frame.filename) {
        ("success", Some(filename)) => {
            tracing::trace!("Item completed: {}", filename);
            Some(StreamEvent::ItemCompleted { filename })
        }
        (kind, _) => {
            tracing::trace!("Ignoring progress frame of type {:?}", kind);
            None
        }
    }
}

/// Largest event, or unterminated line, held while waiting for its end
const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Incremental `text/event-stream` decoder yielding the `data` of each event
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    data: Vec<String>,
    data_len: usize,
    /// Dropping the rest of an oversized line
    skipping: bool,
}

impl SseParser {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.skipping {
                self.skipping = false;
                continue;
            }
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    payloads.push(self.data.join("\n"));
                    self.reset_event();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data_len += value.len();
                self.data.push(value.to_string());
            }
            if self.data_len > MAX_EVENT_BYTES {
                tracing::warn!("Dropping progress event larger than {} bytes", MAX_EVENT_BYTES);
                self.reset_event();
            }
        }

        if self.buffer.len() > MAX_EVENT_BYTES {
            tracing::warn!(
                "Dropping unterminated progress line after {} bytes",
                self.buffer.len()
            );
            self.buffer.clear();
            self.reset_event();
            self.skipping = true;
        } else if self.skipping {
            self.buffer.clear();
        }

        payloads
    }

    fn reset_event(&mut self) {
        self.data.clear();
        self.data_len = 0;
    }
}
