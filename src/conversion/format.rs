use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Media kind a conversion produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Audio,
    Video,
}

/// Container format requested from the conversion service
///
/// The kind is derived from the format, so a session can never carry a
/// mismatched pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
    M4a,
    Mp4,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown output format '{0}' (expected mp3, wav, m4a or mp4)")]
pub struct UnknownFormat(pub String);

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::Mp3, Self::Wav, Self::M4a, Self::Mp4];

    pub fn kind(self) -> OutputKind {
        match self {
            Self::Mp3 | Self::Wav | Self::M4a => OutputKind::Audio,
            Self::Mp4 => OutputKind::Video,
        }
    }

    /// File extension, also the wire name
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::M4a => "m4a",
            Self::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == normalized)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}
