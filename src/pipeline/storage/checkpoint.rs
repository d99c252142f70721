use crate::common::error::Result;
use crate::observability::metrics;
use crate::pipeline::storage::atomic::write_atomically;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The set of video IDs that have already been enriched.
///
/// IDs keep their first-insertion order so the file diffs cleanly between
/// runs; membership checks go through a hash set. The set only ever grows.
#[derive(Debug, Clone, Default)]
pub struct CheckpointState {
    last_updated: Option<DateTime<Utc>>,
    processed_ids: Vec<String>,
    index: HashSet<String>,
}

impl CheckpointState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = Self::new();
        for id in ids {
            state.insert(id);
        }
        state
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Record an ID as processed; returns false if it already was
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.processed_ids.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.processed_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed_ids.is_empty()
    }

    pub fn processed_ids(&self) -> &[String] {
        &self.processed_ids
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }
}

/// On-disk shape of the progress file
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    processed_ids: Vec<String>,
}

/// Accept RFC 3339 or a naive ISO timestamp (taken as UTC); anything else is dropped
fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let text = match raw {
        Some(serde_json::Value::String(s)) => s,
        _ => return Ok(None),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    Ok(NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}

/// File-backed checkpoint persistence
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint. A missing, unreadable or corrupt file yields an
    /// empty state rather than an error.
    pub fn load(&self) -> CheckpointState {
        if !self.path.exists() {
            debug!("No checkpoint at {}, starting fresh", self.path.display());
            return CheckpointState::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read checkpoint {}: {}", self.path.display(), e);
                return CheckpointState::new();
            }
        };

        let file: CheckpointFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!("Ignoring unparsable checkpoint {}: {}", self.path.display(), e);
                return CheckpointState::new();
            }
        };

        let mut state = CheckpointState::from_ids(file.processed_ids);
        state.last_updated = file.last_updated;
        info!(
            "Loaded progress from {}: {} videos already processed",
            state
                .last_updated
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
            state.len()
        );
        state
    }

    /// Persist `state` atomically, stamping the current time as `last_updated`
    pub fn save(&self, state: &mut CheckpointState) -> Result<()> {
        let now = Utc::now();
        let file = CheckpointFile {
            last_updated: Some(now),
            processed_ids: state.processed_ids.clone(),
        };
        write_atomically(&self.path, |w| {
            serde_json::to_writer(&mut *w, &file)?;
            w.write_all(b"\n")?;
            Ok(())
        })?;
        state.last_updated = Some(now);
        metrics::checkpoint::saved();
        debug!("Progress saved: {} videos processed so far", state.len());
        Ok(())
    }
}
