use crate::api::VideoMetadata;
use crate::persistence::StoredEntry;
use serde::Serialize;
use uuid::Uuid;

/// Result of the local format check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Validity {
    Unknown,
    InvalidFormat,
    Valid,
}

/// Progress of the remote metadata lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Idle,
    Pending,
    Resolved,
    Failed,
}

/// One submitted link and its resolution state
///
/// `metadata` is only ever present while `resolution` is `Resolved`; the
/// transition methods below are the only way to change either.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlEntry {
    id: Uuid,
    url: String,
    validity: Validity,
    resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<VideoMetadata>,
}

impl UrlEntry {
    /// Fresh entry with an empty link
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4(), String::new())
    }

    /// Entry restored from storage; validity is recomputed, resolution starts idle
    pub fn with_id(id: Uuid, url: String) -> Self {
        let validity = super::validation::classify(&url);
        Self {
            id,
            url,
            validity,
            resolution: Resolution::Idle,
            metadata: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution == Resolution::Resolved
    }

    /// Whether a remote lookup may be scheduled for the current link
    pub fn is_resolvable(&self) -> bool {
        self.validity == Validity::Valid
    }

    /// Replace the link and reclassify it; any earlier lookup result is dropped
    pub(crate) fn set_url(&mut self, text: &str) {
        self.url = text.to_string();
        self.validity = super::validation::classify(text);
        self.clear();
    }

    pub(crate) fn mark_pending(&mut self) {
        self.resolution = Resolution::Pending;
        self.metadata = None;
    }

    pub(crate) fn resolve(&mut self, metadata: VideoMetadata) {
        self.validity = Validity::Valid;
        self.resolution = Resolution::Resolved;
        self.metadata = Some(metadata);
    }

    pub(crate) fn fail(&mut self) {
        self.validity = Validity::InvalidFormat;
        self.resolution = Resolution::Failed;
        self.metadata = None;
    }

    pub(crate) fn clear(&mut self) {
        self.resolution = Resolution::Idle;
        self.metadata = None;
    }

    pub fn to_stored(&self) -> StoredEntry {
        StoredEntry {
            id: self.id,
            url: self.url.clone(),
        }
    }
}

impl Default for UrlEntry {
    fn default() -> Self {
        Self::new()
    }
}
