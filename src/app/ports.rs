use crate::common::types::{ChartEntry, VideoMetadata};
use async_trait::async_trait;

pub use crate::common::error::FetchError;

/// The quota-limited video metadata endpoint
#[async_trait]
pub trait VideoMetadataPort: Send + Sync {
    /// Metadata for up to 50 IDs in one request. IDs the endpoint does not
    /// know are absent from the result; that is not an error.
    async fn videos_by_id(&self, ids: &[String]) -> Result<Vec<VideoMetadata>, FetchError>;

    /// Best-matching video ID for a free-text name, if any
    async fn search_video_id(&self, name: &str) -> Result<Option<String>, FetchError>;

    /// Current most-popular chart for a region
    async fn most_popular(
        &self,
        region_code: &str,
        max_results: u32,
    ) -> Result<Vec<ChartEntry>, FetchError>;
}
