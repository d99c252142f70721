use serde::{Deserialize, Serialize};

/// Enrichment attributes the remote endpoint returns for one video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub language: String,
    pub duration_seconds: u64,
}

/// One entry of the "most popular" chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartEntry {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub duration_raw: String,
    pub duration_seconds: u64,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

/// Where the IDs for a metadata lookup come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSource {
    /// Video IDs, used as-is
    Ids(Vec<String>),
    /// Free-text names resolved to the best-matching video ID
    Names(Vec<String>),
}

impl IdSource {
    pub fn len(&self) -> usize {
        match self {
            IdSource::Ids(ids) => ids.len(),
            IdSource::Names(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strip the stray quotes some dataset exports leave around IDs
pub fn clean_id(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}
