//! Conversion requests, progress tracking and artifact download

pub mod dispatcher;
pub mod download;
pub mod error;
pub mod format;
pub mod session;
pub mod stream;

pub use dispatcher::{ConversionDispatcher, DispatcherSettings, SubmitRequest, STREAM_LOST_MESSAGE};
pub use error::{ConversionError, ConversionResult};
pub use format::{OutputFormat, OutputKind};
pub use session::{CompletedItem, ConversionMode, ConversionSession, SavedFile, SessionState};
pub use stream::{ChannelState, ProgressStream, StreamEvent, StreamSettings};
