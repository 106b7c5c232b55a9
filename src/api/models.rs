//! Wire and domain models exchanged with the conversion service.

use serde::{Deserialize, Serialize};

/// Preview image attached to a video or playlist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

/// Descriptive metadata for a single video link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: Thumbnail,
    #[serde(default, alias = "available_qualities")]
    pub available_qualities: Vec<String>,
}

/// Aggregate metadata for a playlist plus its expanded item URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistMetadata {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: Thumbnail,
    #[serde(default, alias = "item_count")]
    pub item_count: u64,
    #[serde(default, alias = "view_count")]
    pub view_count: u64,
    #[serde(alias = "item_urls")]
    pub item_urls: Vec<String>,
}

impl PlaylistMetadata {
    /// Number of items a conversion of this playlist is expected to produce
    pub fn expected_items(&self) -> usize {
        if self.item_count > 0 {
            self.item_count as usize
        } else {
            self.item_urls.len()
        }
    }
}

/// Body of `POST /metadata/video`
#[derive(Debug, Serialize)]
pub(crate) struct VideoMetadataRequest<'a> {
    pub urls: [&'a str; 1],
}

/// Response of `POST /metadata/video`
#[derive(Debug, Deserialize)]
pub(crate) struct VideoMetadataResponse {
    #[serde(default)]
    pub urls: Vec<VideoMetadata>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /metadata/playlist`
#[derive(Debug, Serialize)]
pub(crate) struct PlaylistMetadataRequest<'a> {
    pub url: &'a str,
}

/// Playlist info block as sent by services that nest it under `info`
#[derive(Debug, Deserialize)]
pub(crate) struct NestedPlaylistInfo {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: Thumbnail,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub views: u64,
}

/// Response of `POST /metadata/playlist`; both layouts are accepted
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum PlaylistMetadataResponse {
    Nested {
        info: NestedPlaylistInfo,
        #[serde(default)]
        total: u64,
        urls: Vec<String>,
    },
    Flat(PlaylistMetadata),
}

impl From<PlaylistMetadataResponse> for PlaylistMetadata {
    fn from(response: PlaylistMetadataResponse) -> Self {
        match response {
            PlaylistMetadataResponse::Nested { info, total, urls } => Self {
                id: info.id,
                title: info.title,
                description: info.description,
                thumbnail: info.thumbnail,
                item_count: if total > 0 { total } else { info.total_items },
                view_count: info.views,
                item_urls: urls,
            },
            PlaylistMetadataResponse::Flat(metadata) => metadata,
        }
    }
}

/// Body of `POST /convert`
#[derive(Debug, Serialize)]
pub(crate) struct ConvertRequest<'a> {
    pub urls: &'a [String],
    pub format: crate::conversion::format::OutputFormat,
    pub kind: crate::conversion::format::OutputKind,
}

/// Frame carried by the `/events` push channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgressFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_video_metadata_accepts_both_casings() {
        let camel: VideoMetadata = serde_json::from_str(
            r#"{"title":"A","thumbnail":{"url":"t","width":120,"height":90},"availableQualities":["720p"]}"#,
        )
        .unwrap();
        let snake: VideoMetadata = serde_json::from_str(
            r#"{"title":"A","thumbnail":{"url":"t","width":120,"height":90},"available_qualities":["720p"]}"#,
        )
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.description, "");
    }

    #[test]
    fn test_nested_playlist_response() {
        let body = r#"{
            "info": {
                "id": "PL1",
                "thumbnail": {"url": "https://i.ytimg.com/x.jpg", "width": 480, "height": 360},
                "url": "https://www.youtube.com/playlist?list=PL1",
                "title": "Mix",
                "description": "d",
                "total_items": 3,
                "views": 1200
            },
            "total": 2,
            "urls": ["u1", "u2"]
        }"#;
        let response: PlaylistMetadataResponse = serde_json::from_str(body).unwrap();
        let metadata = PlaylistMetadata::from(response);
        assert_eq!(metadata.id, "PL1");
        assert_eq!(metadata.item_count, 2);
        assert_eq!(metadata.view_count, 1200);
        assert_eq!(metadata.item_urls, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[test]
    fn test_flat_playlist_response() {
        let body = r#"{"id":"PL2","title":"Flat","itemCount":0,"viewCount":5,"itemUrls":["a","b","c"]}"#;
        let response: PlaylistMetadataResponse = serde_json::from_str(body).unwrap();
        let metadata = PlaylistMetadata::from(response);
        assert_eq!(metadata.title, "Flat");
        assert_eq!(metadata.expected_items(), 3);
    }

    #[test]
    fn test_progress_frame_without_filename() {
        let frame: ProgressFrame = serde_json::from_str(r#"{"type":"started"}"#).unwrap();
        assert_eq!(frame.kind, "started");
        assert_eq!(frame.filename, None);
    }
}
