use crate::app::ports::{FetchError, VideoMetadataPort};
use crate::common::config::EnrichSettings;
use crate::common::constants::{
    DEFAULT_BACKOFF_MS, DEFAULT_LENGTH, DEFAULT_MAX_RETRIES, DEFAULT_PACING_MS, LANGUAGE_COLUMN,
    LENGTH_COLUMN, MAX_BATCH_SIZE, UNKNOWN_LANGUAGE, VIDEO_ID_COLUMN,
};
use crate::common::error::Result;
use crate::common::types::{clean_id, VideoMetadata};
use crate::observability::metrics;
use crate::pipeline::storage::{CheckpointState, CheckpointStore, Table};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Tunables for the batched fetch loop
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// IDs per request, clamped to the endpoint's cap of 50
    pub batch_size: usize,
    /// Pause after each successful batch
    pub pacing: Duration,
    /// Pause before retrying a batch that failed transiently
    pub backoff: Duration,
    /// Extra attempts per batch after a transient failure
    pub max_retries: u32,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            pacing: Duration::from_millis(DEFAULT_PACING_MS),
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl From<&EnrichSettings> for EnrichConfig {
    fn from(settings: &EnrichSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            pacing: settings.pacing(),
            backoff: settings.backoff(),
            max_retries: settings.max_retries,
        }
    }
}

impl EnrichConfig {
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }
}

/// What happened to a single batch once retries are accounted for
#[derive(Debug)]
pub(crate) enum ChunkResult {
    Fetched(Vec<VideoMetadata>),
    /// Retries ran out; the IDs stay pending for a later run
    Deferred,
    QuotaExceeded,
}

/// Request one batch, retrying transient failures up to `max_retries` times.
/// Returns the result plus the number of requests issued.
pub(crate) async fn fetch_chunk(
    port: &dyn VideoMetadataPort,
    chunk: &[String],
    config: &EnrichConfig,
) -> (ChunkResult, u32) {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let started = Instant::now();
        let result = port.videos_by_id(chunk).await;
        metrics::enrich::request_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(items) => return (ChunkResult::Fetched(items), attempts),
            Err(FetchError::QuotaExceeded(message)) => {
                warn!("Quota exceeded: {}", message);
                metrics::enrich::quota_exceeded();
                return (ChunkResult::QuotaExceeded, attempts);
            }
            Err(FetchError::Transient(message)) => {
                metrics::enrich::transient_error();
                if attempts > config.max_retries {
                    warn!(
                        "Batch failed {} time(s), deferring {} IDs to a later run: {}",
                        attempts,
                        chunk.len(),
                        message
                    );
                    metrics::enrich::batch_deferred();
                    return (ChunkResult::Deferred, attempts);
                }
                warn!(
                    "HTTP error: {}. Waiting {:?} before retrying the batch...",
                    message, config.backoff
                );
                tokio::time::sleep(config.backoff).await;
            }
        }
    }
}

/// Counts describing one enrichment run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichOutcome {
    pub quota_exceeded: bool,
    /// Distinct IDs in the table
    pub total_ids: usize,
    /// IDs in the checkpoint when the run started
    pub already_processed: usize,
    /// IDs this run set out to fetch
    pub pending_ids: usize,
    pub chunks_total: usize,
    pub chunks_attempted: usize,
    pub chunks_succeeded: usize,
    pub chunks_deferred: usize,
    pub requests_sent: usize,
    pub ids_enriched: usize,
    /// Requested IDs the endpoint returned nothing for
    pub ids_missing: usize,
    pub rows_updated: usize,
}

impl EnrichOutcome {
    /// IDs of the table still missing from the checkpoint
    pub fn remaining(&self) -> usize {
        self.pending_ids - self.ids_enriched
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total_ids == 0 {
            return 100.0;
        }
        (self.total_ids - self.remaining()) as f64 / self.total_ids as f64 * 100.0
    }
}

/// Distinct IDs in first-seen order plus the rows each one occupies
struct IdIndex {
    order: Vec<String>,
    rows: HashMap<String, Vec<usize>>,
}

impl IdIndex {
    fn build(table: &Table, id_col: usize) -> Self {
        let mut order = Vec::new();
        let mut rows: HashMap<String, Vec<usize>> = HashMap::new();
        for (row, raw) in table.column(id_col).enumerate() {
            let id = clean_id(raw);
            if id.is_empty() {
                continue;
            }
            match rows.get_mut(id) {
                Some(list) => list.push(row),
                None => {
                    order.push(id.to_string());
                    rows.insert(id.to_string(), vec![row]);
                }
            }
        }
        Self { order, rows }
    }
}

/// Fetches language and duration for every not-yet-processed video in a
/// table, checkpointing after each successful batch.
pub struct BatchEnricher {
    port: Arc<dyn VideoMetadataPort>,
    store: CheckpointStore,
    config: EnrichConfig,
}

impl BatchEnricher {
    pub fn new(port: Arc<dyn VideoMetadataPort>, store: CheckpointStore, config: EnrichConfig) -> Self {
        Self { port, store, config }
    }

    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Enrich `table` in place. Quota exhaustion is reported through
    /// `EnrichOutcome::quota_exceeded`, not as an error; only a failure to
    /// persist aborts the run.
    ///
    /// With `table_output`, the table is written there after every successful
    /// batch and before the checkpoint, so the checkpoint never records an ID
    /// whose metadata is not on disk.
    #[instrument(skip_all, fields(rows = table.len(), processed = checkpoint.len()))]
    pub async fn enrich(
        &self,
        table: &mut Table,
        checkpoint: &mut CheckpointState,
        table_output: Option<&Path>,
    ) -> Result<EnrichOutcome> {
        let id_col = table.require_column(VIDEO_ID_COLUMN)?;
        let language_col = table.add_column(LANGUAGE_COLUMN, UNKNOWN_LANGUAGE);
        let length_col = table.add_column(LENGTH_COLUMN, DEFAULT_LENGTH);

        let index = IdIndex::build(table, id_col);
        let pending: Vec<String> = index
            .order
            .iter()
            .filter(|id| !checkpoint.contains(id))
            .cloned()
            .collect();

        let batch_size = self.config.effective_batch_size();
        let mut outcome = EnrichOutcome {
            total_ids: index.order.len(),
            already_processed: index.order.len() - pending.len(),
            pending_ids: pending.len(),
            chunks_total: pending.len().div_ceil(batch_size),
            ..Default::default()
        };

        info!("Total videos: {}", outcome.total_ids);
        info!("Already processed: {}", outcome.already_processed);
        info!("Remaining to process: {}", outcome.pending_ids);

        if pending.is_empty() {
            info!("All videos have been processed! No API calls needed.");
            return Ok(outcome);
        }

        for (n, chunk) in pending.chunks(batch_size).enumerate() {
            outcome.chunks_attempted += 1;
            let (result, attempts) = fetch_chunk(self.port.as_ref(), chunk, &self.config).await;
            outcome.requests_sent += attempts as usize;

            let items = match result {
                ChunkResult::Fetched(items) => items,
                ChunkResult::Deferred => {
                    outcome.chunks_deferred += 1;
                    continue;
                }
                ChunkResult::QuotaExceeded => {
                    warn!("Quota exceeded! Saving progress and exiting...");
                    outcome.quota_exceeded = true;
                    break;
                }
            };

            let requested: HashSet<&str> = chunk.iter().map(String::as_str).collect();
            let mut found = 0usize;
            for item in items {
                if !requested.contains(item.id.as_str()) {
                    debug!("Ignoring unrequested ID {} in response", item.id);
                    continue;
                }
                if let Some(rows) = index.rows.get(&item.id) {
                    for &row in rows {
                        table.set_cell(row, language_col, item.language.clone());
                        table.set_cell(row, length_col, item.duration_seconds.to_string());
                    }
                    outcome.rows_updated += rows.len();
                }
                if checkpoint.insert(item.id) {
                    found += 1;
                }
            }
            let missing = chunk.len() - found;
            outcome.ids_enriched += found;
            outcome.ids_missing += missing;
            outcome.chunks_succeeded += 1;

            if let Some(path) = table_output {
                table.write_csv(path)?;
            }
            self.store.save(checkpoint)?;
            metrics::enrich::batch_success(found, missing);

            info!(
                "Processed batch {}/{} ({} videos, {} not found) - {:.1}% complete",
                n + 1,
                outcome.chunks_total,
                chunk.len(),
                missing,
                outcome.percent_complete()
            );

            if n + 1 < outcome.chunks_total {
                tokio::time::sleep(self.config.pacing).await;
            }
        }

        Ok(outcome)
    }
}

/// Result of fetching an arbitrary ID list without a checkpoint
#[derive(Debug, Clone, Default)]
pub struct FetchAll {
    pub items: Vec<VideoMetadata>,
    pub quota_exceeded: bool,
    pub deferred_ids: Vec<String>,
}

/// Batched fetch with the same retry and quota rules as the enricher, for
/// callers that keep no checkpoint.
pub async fn fetch_all(port: &dyn VideoMetadataPort, ids: &[String], config: &EnrichConfig) -> FetchAll {
    let batch_size = config.effective_batch_size();
    let total_chunks = ids.len().div_ceil(batch_size);
    let mut out = FetchAll::default();

    for (n, chunk) in ids.chunks(batch_size).enumerate() {
        match fetch_chunk(port, chunk, config).await.0 {
            ChunkResult::Fetched(items) => {
                out.items.extend(items);
                info!("Fetched batch {}/{}", n + 1, total_chunks);
                if n + 1 < total_chunks {
                    tokio::time::sleep(config.pacing).await;
                }
            }
            ChunkResult::Deferred => out.deferred_ids.extend(chunk.iter().cloned()),
            ChunkResult::QuotaExceeded => {
                out.quota_exceeded = true;
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ChartEntry;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted endpoint: pops one planned response per call, falling back to
    /// answering every known ID once the script runs out.
    struct FakeEndpoint {
        known: HashMap<String, VideoMetadata>,
        script: Mutex<VecDeque<Option<FetchError>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeEndpoint {
        fn new(ids: &[&str]) -> Self {
            let known = ids
                .iter()
                .map(|id| {
                    (
                        id.to_string(),
                        VideoMetadata {
                            id: id.to_string(),
                            language: "en".to_string(),
                            duration_seconds: 60,
                        },
                    )
                })
                .collect();
            Self {
                known,
                script: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Queue outcomes for the next calls; `None` means answer normally
        fn with_script(self, script: Vec<Option<FetchError>>) -> Self {
            *self.script.lock().unwrap() = script.into();
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VideoMetadataPort for FakeEndpoint {
        async fn videos_by_id(&self, ids: &[String]) -> std::result::Result<Vec<VideoMetadata>, FetchError> {
            self.calls.lock().unwrap().push(ids.to_vec());
            if let Some(Some(err)) = self.script.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(ids.iter().filter_map(|id| self.known.get(id).cloned()).collect())
        }

        async fn search_video_id(&self, _name: &str) -> std::result::Result<Option<String>, FetchError> {
            Ok(None)
        }

        async fn most_popular(&self, _region: &str, _max: u32) -> std::result::Result<Vec<ChartEntry>, FetchError> {
            Ok(Vec::new())
        }
    }

    fn fast_config(batch_size: usize) -> EnrichConfig {
        EnrichConfig {
            batch_size,
            pacing: Duration::ZERO,
            backoff: Duration::ZERO,
            max_retries: 1,
        }
    }

    fn table_with_ids(ids: &[&str]) -> Table {
        let mut table = Table::new([VIDEO_ID_COLUMN, "title"]);
        for id in ids {
            table.push_row(vec![id.to_string(), format!("title {}", id)]);
        }
        table
    }

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("v{:02}", i)).collect()
    }

    #[tokio::test]
    async fn test_resumes_only_unprocessed_ids() {
        let all = ids(10);
        let all_refs: Vec<&str> = all.iter().map(String::as_str).collect();
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let endpoint = Arc::new(FakeEndpoint::new(&all_refs));
        let enricher = BatchEnricher::new(endpoint.clone(), store.clone(), fast_config(3));

        let mut table = table_with_ids(&all_refs);
        let mut checkpoint = CheckpointState::from_ids(all[..4].iter().cloned());
        let outcome = enricher.enrich(&mut table, &mut checkpoint, None).await.unwrap();

        let requested: Vec<String> = endpoint.calls().into_iter().flatten().collect();
        assert_eq!(requested, all[4..].to_vec());
        assert_eq!(outcome.already_processed, 4);
        assert_eq!(outcome.pending_ids, 6);
        assert_eq!(outcome.chunks_total, 2);
        assert!(!outcome.quota_exceeded);
        assert_eq!(checkpoint.len(), 10);
        assert_eq!(store.load().len(), 10);
    }

    #[tokio::test]
    async fn test_quota_on_third_of_five_chunks() {
        let all = ids(10);
        let all_refs: Vec<&str> = all.iter().map(String::as_str).collect();
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let endpoint = Arc::new(FakeEndpoint::new(&all_refs).with_script(vec![
            None,
            None,
            Some(FetchError::QuotaExceeded("daily limit".to_string())),
        ]));
        let enricher = BatchEnricher::new(endpoint.clone(), store.clone(), fast_config(2));

        let mut table = table_with_ids(&all_refs);
        let mut checkpoint = CheckpointState::new();
        let outcome = enricher.enrich(&mut table, &mut checkpoint, None).await.unwrap();

        assert!(outcome.quota_exceeded);
        assert_eq!(outcome.chunks_total, 5);
        assert_eq!(outcome.chunks_attempted, 3);
        assert_eq!(endpoint.calls().len(), 3);
        assert_eq!(checkpoint.processed_ids(), &all[..4]);
        assert_eq!(store.load().processed_ids(), &all[..4]);

        let lang = table.require_column(LANGUAGE_COLUMN).unwrap();
        let length = table.require_column(LENGTH_COLUMN).unwrap();
        for row in 0..4 {
            assert_eq!(table.cell(row, lang), Some("en"));
            assert_eq!(table.cell(row, length), Some("60"));
        }
        for row in 4..10 {
            assert_eq!(table.cell(row, lang), Some(UNKNOWN_LANGUAGE));
            assert_eq!(table.cell(row, length), Some(DEFAULT_LENGTH));
        }
    }

    #[tokio::test]
    async fn test_partial_miss_leaves_absent_id_pending() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let endpoint = Arc::new(FakeEndpoint::new(&["a", "b"]));
        let enricher = BatchEnricher::new(endpoint, store.clone(), fast_config(50));

        let mut table = table_with_ids(&["a", "b", "c"]);
        let mut checkpoint = CheckpointState::new();
        let outcome = enricher.enrich(&mut table, &mut checkpoint, None).await.unwrap();

        assert_eq!(checkpoint.processed_ids(), &["a", "b"]);
        assert!(!checkpoint.contains("c"));
        assert_eq!(outcome.ids_enriched, 2);
        assert_eq!(outcome.ids_missing, 1);
        assert_eq!(outcome.remaining(), 1);
        assert_eq!(table.cell(2, 2), Some(UNKNOWN_LANGUAGE));
    }

    #[tokio::test]
    async fn test_transient_error_retries_same_chunk() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let endpoint = Arc::new(
            FakeEndpoint::new(&["a", "b", "c", "d"])
                .with_script(vec![Some(FetchError::Transient("503".to_string()))]),
        );
        let enricher = BatchEnricher::new(endpoint.clone(), store, fast_config(2));

        let mut table = table_with_ids(&["a", "b", "c", "d"]);
        let mut checkpoint = CheckpointState::new();
        let outcome = enricher.enrich(&mut table, &mut checkpoint, None).await.unwrap();

        let calls = endpoint.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(outcome.requests_sent, 3);
        assert_eq!(outcome.chunks_deferred, 0);
        assert_eq!(checkpoint.len(), 4);
    }

    #[tokio::test]
    async fn test_exhausted_retries_defer_chunk_and_continue() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let endpoint = Arc::new(FakeEndpoint::new(&["a", "b", "c", "d"]).with_script(vec![
            Some(FetchError::Transient("timeout".to_string())),
            Some(FetchError::Transient("timeout".to_string())),
        ]));
        let enricher = BatchEnricher::new(endpoint.clone(), store, fast_config(2));

        let mut table = table_with_ids(&["a", "b", "c", "d"]);
        let mut checkpoint = CheckpointState::new();
        let outcome = enricher.enrich(&mut table, &mut checkpoint, None).await.unwrap();

        assert!(!outcome.quota_exceeded);
        assert_eq!(outcome.chunks_deferred, 1);
        assert_eq!(outcome.chunks_succeeded, 1);
        assert_eq!(checkpoint.processed_ids(), &["c", "d"]);
    }

    #[tokio::test]
    async fn test_empty_pending_makes_no_requests() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let endpoint = Arc::new(FakeEndpoint::new(&["a"]));
        let enricher = BatchEnricher::new(endpoint.clone(), store.clone(), fast_config(50));

        let mut table = table_with_ids(&["a", "a"]);
        let before = table.clone();
        let mut checkpoint = CheckpointState::from_ids(["a"]);
        let outcome = enricher.enrich(&mut table, &mut checkpoint, None).await.unwrap();

        assert!(endpoint.calls().is_empty());
        assert!(!outcome.quota_exceeded);
        assert_eq!(outcome.chunks_total, 0);
        assert_eq!(outcome.percent_complete(), 100.0);
        // Only the default enrichment columns were added
        assert_eq!(table.len(), before.len());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_duplicate_rows_all_receive_metadata() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let endpoint = Arc::new(FakeEndpoint::new(&["a", "b"]));
        let enricher = BatchEnricher::new(endpoint.clone(), store, fast_config(50));

        let mut table = table_with_ids(&["a", "\"b\"", "a"]);
        let mut checkpoint = CheckpointState::new();
        let outcome = enricher.enrich(&mut table, &mut checkpoint, None).await.unwrap();

        assert_eq!(endpoint.calls(), vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(outcome.rows_updated, 3);
        let lang = table.require_column(LANGUAGE_COLUMN).unwrap();
        assert!(table.column(lang).all(|l| l == "en"));
    }

    #[tokio::test]
    async fn test_table_reaches_disk_before_checkpoint() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("enriched.csv");
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let endpoint = Arc::new(FakeEndpoint::new(&["a", "b", "c"]).with_script(vec![
            None,
            Some(FetchError::QuotaExceeded("quota".to_string())),
        ]));
        let enricher = BatchEnricher::new(endpoint, store.clone(), fast_config(2));

        let mut table = table_with_ids(&["a", "b", "c"]);
        let mut checkpoint = CheckpointState::new();
        enricher
            .enrich(&mut table, &mut checkpoint, Some(output.as_path()))
            .await
            .unwrap();
        drop(table);

        let on_disk = Table::read_csv(&output, &crate::pipeline::storage::CsvOptions::standard()).unwrap();
        let lang = on_disk.require_column(LANGUAGE_COLUMN).unwrap();
        for id in store.load().processed_ids() {
            let row = on_disk.column(0).position(|v| v == id.as_str()).unwrap();
            assert_eq!(on_disk.cell(row, lang), Some("en"));
        }
        assert_eq!(on_disk.cell(2, lang), Some(UNKNOWN_LANGUAGE));
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_quota() {
        let endpoint = FakeEndpoint::new(&["a", "b", "c"]).with_script(vec![
            None,
            Some(FetchError::QuotaExceeded("quota".to_string())),
        ]);
        let wanted: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let result = fetch_all(&endpoint, &wanted, &fast_config(2)).await;
        assert!(result.quota_exceeded);
        assert_eq!(result.items.len(), 2);
        assert!(result.deferred_ids.is_empty());
    }
}
