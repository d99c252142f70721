/// Column and default-value constants to keep the CSV layout consistent
/// between the normalizer, the enrichment run and downstream consumers.

// Source columns (present in the raw trending dataset)
pub const VIDEO_ID_COLUMN: &str = "video_id";
pub const TRENDING_DATE_COLUMN: &str = "trending_date";
pub const DESCRIPTION_COLUMN: &str = "description";
pub const TAGS_COLUMN: &str = "tags";

// Enrichment columns (added by the enrichment run)
pub const LANGUAGE_COLUMN: &str = "video_language";
pub const LENGTH_COLUMN: &str = "video_length";

// Default values for rows that have not been enriched yet
pub const UNKNOWN_LANGUAGE: &str = "unknown";
pub const DEFAULT_LENGTH: &str = "0";

// Derived description tokens
pub const DESCRIPTION_PRESENT: &str = "Y";
pub const DESCRIPTION_ABSENT: &str = "N";

/// Literal the dataset uses for "this video has no tags"
pub const NO_TAGS_SENTINEL: &str = "[None]";

// YouTube Data API limits and defaults
pub const MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_PACING_MS: u64 = 500;
pub const DEFAULT_BACKOFF_MS: u64 = 10_000;
pub const DEFAULT_MAX_RETRIES: u32 = 1;

// Default file locations
pub const DEFAULT_CONFIG_FILE: &str = "trending.toml";
pub const DEFAULT_PROGRESS_FILE: &str = "youtube_api_progress.json";

// Environment variables
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";
pub const BASE_URL_ENV: &str = "YOUTUBE_API_BASE_URL";

/// Columns the snapshot CSV is written with, in order
pub fn snapshot_headers() -> Vec<&'static str> {
    vec![
        "date",
        "id",
        "title",
        "channel",
        "duration_raw",
        "duration_seconds",
        "views",
        "likes",
        "comments",
    ]
}
