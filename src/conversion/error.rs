use crate::api::ApiError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    /// No resolved links in individual mode, or an empty playlist
    #[error("Nothing to convert: {0}")]
    NothingToConvert(&'static str),

    #[error("Conversion failed: {0}")]
    Api(#[from] ApiError),

    #[error("Failed to save {path:?}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The progress channel dropped and did not recover while the request ran
    #[error("Connection to the server was lost during conversion.")]
    StreamLost,

    /// The session was cancelled or replaced before its response arrived
    #[error("Conversion was cancelled or replaced by a newer one")]
    Superseded,
}

pub type ConversionResult<T> = Result<T, ConversionError>;

impl ConversionError {
    pub fn save(path: &Path, source: std::io::Error) -> Self {
        Self::Save {
            path: path.to_path_buf(),
            source,
        }
    }
}
