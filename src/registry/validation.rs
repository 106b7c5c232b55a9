//! Pure link-format classification

use super::entry::Validity;
use url::Url;

/// Hosts of the supported video-sharing service
const RECOGNIZED_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Classify a link by format alone
///
/// Deterministic: the same input always yields the same result. Empty input
/// is `Unknown`; anything else is either `Valid` or `InvalidFormat`.
pub fn classify(text: &str) -> Validity {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Validity::Unknown;
    }

    if is_recognized_link(trimmed) {
        Validity::Valid
    } else {
        Validity::InvalidFormat
    }
}

fn is_recognized_link(text: &str) -> bool {
    let Ok(url) = Url::parse(text) else {
        return false;
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }

    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    if !RECOGNIZED_HOSTS.contains(&host.as_str()) {
        return false;
    }

    // A bare host does not point at anything convertible
    let has_path = !url.path().trim_matches('/').is_empty();
    has_path || url.query().is_some()
}
