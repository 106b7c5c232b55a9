use super::format::{OutputFormat, OutputKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Whether a conversion covers individually entered links or a playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    #[default]
    Individual,
    Playlist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedItem {
    pub filename: String,
    pub completed_at: DateTime<Utc>,
}

/// Artifact written to disk for a completed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

/// One conversion batch and its progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionSession {
    pub id: Uuid,
    pub mode: ConversionMode,
    pub output_kind: OutputKind,
    pub output_format: OutputFormat,
    pub total_expected: usize,
    pub completed_items: Vec<CompletedItem>,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_file: Option<SavedFile>,
    pub started_at: DateTime<Utc>,
}

impl ConversionSession {
    /// New running session with no completed items
    pub fn start(mode: ConversionMode, output_format: OutputFormat, total_expected: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            output_kind: output_format.kind(),
            output_format,
            total_expected,
            completed_items: Vec::new(),
            state: SessionState::Running,
            error: None,
            saved_file: None,
            started_at: Utc::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Items still outstanding; never negative even if the service reports extras
    pub fn remaining(&self) -> usize {
        self.total_expected.saturating_sub(self.completed_items.len())
    }

    /// Completion percentage capped at 100
    pub fn progress_percent(&self) -> f64 {
        if self.total_expected == 0 {
            return 0.0;
        }
        let ratio = self.completed_items.len() as f64 / self.total_expected as f64;
        (ratio * 100.0).min(100.0)
    }

    /// Append a finished item; ignored once the session left `Running`
    pub fn record_completed(&mut self, filename: impl Into<String>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.completed_items.push(CompletedItem {
            filename: filename.into(),
            completed_at: Utc::now(),
        });
        true
    }

    pub fn complete(&mut self, saved_file: Option<SavedFile>) {
        if self.is_running() {
            self.state = SessionState::Completed;
            self.saved_file = saved_file;
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_running() {
            self.state = SessionState::Failed;
            self.error = Some(message.into());
        }
    }

    pub fn cancel(&mut self) {
        if self.is_running() {
            self.state = SessionState::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_accounting() {
        let mut session = ConversionSession::start(ConversionMode::Playlist, OutputFormat::Mp3, 5);
        for i in 0..3 {
            assert!(session.record_completed(format!("song{}.mp3", i)));
        }

        assert_eq!(session.completed_items.len(), 3);
        assert_eq!(session.remaining(), 2);
        assert!((session.progress_percent() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remaining_saturates() {
        let mut session = ConversionSession::start(ConversionMode::Playlist, OutputFormat::Wav, 1);
        session.record_completed("a.wav");
        session.record_completed("b.wav");

        assert_eq!(session.remaining(), 0);
        assert_eq!(session.progress_percent(), 100.0);
    }

    #[test]
    fn test_finished_session_ignores_updates() {
        let mut session = ConversionSession::start(ConversionMode::Individual, OutputFormat::Mp4, 2);
        assert_eq!(session.output_kind, OutputKind::Video);

        session.cancel();
        assert!(!session.record_completed("late.mp4"));
        session.fail("too late");
        session.complete(None);

        assert_eq!(session.state, SessionState::Cancelled);
        assert!(session.error.is_none());
        assert!(session.completed_items.is_empty());
    }

    #[test]
    fn test_zero_expected_has_no_progress() {
        let session = ConversionSession::start(ConversionMode::Individual, OutputFormat::Mp3, 0);
        assert_eq!(session.progress_percent(), 0.0);
        assert_eq!(session.remaining(), 0);
    }
}
