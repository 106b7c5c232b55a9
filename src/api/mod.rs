//! Client for the remote conversion/metadata service

pub mod client;
pub mod error;
pub mod http_errors;
pub mod models;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use models::{PlaylistMetadata, Thumbnail, VideoMetadata};

use std::future::Future;

/// Source of link metadata used by the debounced resolvers
///
/// Implemented by [`ApiClient`]; tests substitute in-memory sources so the
/// debounce timing can run under paused tokio time.
pub trait MetadataSource: Send + Sync + 'static {
    /// Resolve descriptive metadata for a single video link
    fn video_metadata(&self, url: &str) -> impl Future<Output = ApiResult<VideoMetadata>> + Send;

    /// Resolve a playlist link into its metadata and item URLs
    fn playlist_metadata(&self, url: &str)
        -> impl Future<Output = ApiResult<PlaylistMetadata>> + Send;
}
