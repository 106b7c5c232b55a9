use super::error::{ApiError, ApiResult};
use super::models::{
    ConvertRequest, PlaylistMetadata, PlaylistMetadataRequest, PlaylistMetadataResponse,
    VideoMetadata, VideoMetadataRequest, VideoMetadataResponse,
};
use super::MetadataSource;
use crate::app::config::ApiConfig;
use crate::conversion::format::OutputFormat;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use url::Url;

pub const VIDEO_METADATA_PATH: &str = "metadata/video";
pub const PLAYLIST_METADATA_PATH: &str = "metadata/playlist";
pub const CONVERT_PATH: &str = "convert";
pub const EVENTS_PATH: &str = "events";

/// Client for the remote conversion service
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client from the `[api]` configuration section
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.base_url)?,
        })
    }

    /// Create a client for `base_url` with default settings
    pub fn with_base_url(base_url: &str) -> ApiResult<Self> {
        Self::new(&ApiConfig {
            base_url: base_url.to_string(),
            ..ApiConfig::default()
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path against the base URL
    pub fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Fetch metadata for a single video link
    pub async fn fetch_video_metadata(&self, url: &str) -> ApiResult<VideoMetadata> {
        let bytes = self
            .post_json(VIDEO_METADATA_PATH, &VideoMetadataRequest { urls: [url] })
            .await?
            .bytes()
            .await?;

        let body: VideoMetadataResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::malformed("/metadata/video", e.to_string()))?;

        if let Some(error) = body.error {
            return Err(ApiError::Remote(error));
        }

        body.urls
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::malformed("/metadata/video", "empty result list"))
    }

    /// Fetch aggregate metadata and the expanded item list for a playlist
    pub async fn fetch_playlist_metadata(&self, url: &str) -> ApiResult<PlaylistMetadata> {
        let bytes = self
            .post_json(PLAYLIST_METADATA_PATH, &PlaylistMetadataRequest { url })
            .await?
            .bytes()
            .await?;

        let body: PlaylistMetadataResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::malformed("/metadata/playlist", e.to_string()))?;

        Ok(body.into())
    }

    /// Send the batch conversion request
    ///
    /// Returns the successful response with its body still unread so the
    /// caller can stream the artifact to disk.
    pub async fn convert(
        &self,
        urls: &[String],
        format: OutputFormat,
    ) -> ApiResult<reqwest::Response> {
        self.post_json(
            CONVERT_PATH,
            &ConvertRequest {
                urls,
                format,
                kind: format.kind(),
            },
        )
        .await
    }

    /// Open the server-push progress channel
    pub async fn open_events(&self) -> ApiResult<reqwest::Response> {
        let url = self.endpoint(EVENTS_PATH)?;
        tracing::trace!("Opening event stream at {}", url);

        // The channel is long-lived, so the per-request timeout does not apply
        let response = self
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .timeout(Duration::from_secs(60 * 60 * 24))
            .send()
            .await?;

        check_status(response).await
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ApiResult<reqwest::Response> {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_vec(body)
            .map_err(|e| ApiError::malformed("request", e.to_string()))?;

        tracing::trace!("POST {} ({} bytes)", url, payload.len());
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(payload)
            .send()
            .await?;
        tracing::trace!("Received response with status: {}", response.status());

        check_status(response).await
    }
}

/// Turn a non-success response into [`ApiError::Rejected`] carrying the body text
async fn check_status(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(ApiError::rejected(status.as_u16(), error_detail(&text)))
}

/// Prefer the `error` field of a JSON error body, fall back to the raw text
fn error_detail(text: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }

    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => body.error,
        Err(_) => text.trim().to_string(),
    }
}

/// Ensure the base URL path ends with `/` so endpoint joins append instead of replace
fn normalize_base_url(base_url: &str) -> ApiResult<Url> {
    let mut url = Url::parse(base_url.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

impl MetadataSource for ApiClient {
    fn video_metadata(&self, url: &str) -> impl Future<Output = ApiResult<VideoMetadata>> + Send {
        self.fetch_video_metadata(url)
    }

    fn playlist_metadata(
        &self,
        url: &str,
    ) -> impl Future<Output = ApiResult<PlaylistMetadata>> + Send {
        self.fetch_playlist_metadata(url)
    }
}
