use crate::app::ports::VideoMetadataPort;
use crate::common::constants::{
    DEFAULT_LENGTH, LANGUAGE_COLUMN, LENGTH_COLUMN, UNKNOWN_LANGUAGE, VIDEO_ID_COLUMN,
};
use crate::common::error::Result;
use crate::common::types::clean_id;
use crate::pipeline::processing::enrich::{BatchEnricher, EnrichConfig, EnrichOutcome};
use crate::pipeline::storage::{CheckpointState, CheckpointStore, CsvOptions, Table};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How an enrichment run ended, from the caller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// The endpoint refused further requests; run again after the quota resets
    QuotaExceeded,
    /// Some IDs are still pending (missing from responses or deferred)
    Incomplete,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichRunReport {
    pub outcome: EnrichOutcome,
    pub status: RunStatus,
    pub output_file: PathBuf,
}

/// Progress of the working table against the checkpoint, without any API calls
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total_ids: usize,
    pub processed: usize,
    pub remaining: usize,
    pub percent_complete: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

pub fn progress_summary(table: &Table, checkpoint: &CheckpointState) -> Result<ProgressSummary> {
    let id_col = table.require_column(VIDEO_ID_COLUMN)?;
    let ids: HashSet<&str> = table
        .column(id_col)
        .map(clean_id)
        .filter(|id| !id.is_empty())
        .collect();
    let processed = ids.iter().filter(|id| checkpoint.contains(id)).count();
    let total_ids = ids.len();
    let percent_complete = if total_ids == 0 {
        100.0
    } else {
        processed as f64 / total_ids as f64 * 100.0
    };
    Ok(ProgressSummary {
        total_ids,
        processed,
        remaining: total_ids - processed,
        percent_complete,
        last_updated: checkpoint.last_updated(),
    })
}

/// Use case for one resumable enrichment run over a cleaned table file
pub struct EnrichUseCase {
    enricher: BatchEnricher,
}

impl EnrichUseCase {
    pub fn new(port: Arc<dyn VideoMetadataPort>, progress_file: PathBuf, config: EnrichConfig) -> Self {
        Self {
            enricher: BatchEnricher::new(port, CheckpointStore::new(progress_file), config),
        }
    }

    /// Pick the table to work on: a previous run's output if it already has
    /// the enrichment columns, otherwise the cleaned input with defaults added.
    pub fn load_working_table(input: &Path, output: &Path) -> Result<Table> {
        if output.exists() {
            info!(
                "Output file {} already exists. Loading for incremental update...",
                output.display()
            );
            let existing = Table::read_csv(output, &CsvOptions::standard())?;
            if existing.has_column(LANGUAGE_COLUMN) && existing.has_column(LENGTH_COLUMN) {
                info!("Loaded existing enriched data with {} videos", existing.len());
                return Ok(existing);
            }
            warn!(
                "{} lacks enrichment columns, starting from {}",
                output.display(),
                input.display()
            );
        }

        info!("Reading data from {}...", input.display());
        let mut table = Table::read_csv(input, &CsvOptions::standard())?;
        table.add_column(LANGUAGE_COLUMN, UNKNOWN_LANGUAGE);
        table.add_column(LENGTH_COLUMN, DEFAULT_LENGTH);
        Ok(table)
    }

    #[instrument(skip(self), fields(input = %input.display(), output = %output.display()))]
    pub async fn run(&self, input: &Path, output: &Path) -> Result<EnrichRunReport> {
        let mut table = Self::load_working_table(input, output)?;
        let mut checkpoint = self.enricher.store().load();

        info!("Fetching video details from the YouTube API...");
        let outcome = self.enricher.enrich(&mut table, &mut checkpoint, Some(output)).await?;

        if outcome.pending_ids > 0 {
            table.write_csv(output)?;
            info!("Enriched data saved to {}", output.display());
        } else if !output.exists() {
            table.write_csv(output)?;
        }

        info!("Updated {} rows in this session", outcome.rows_updated);
        info!(
            "Total videos processed so far: {}/{} ({:.1}%)",
            outcome.total_ids - outcome.remaining(),
            outcome.total_ids,
            outcome.percent_complete()
        );

        let status = if outcome.quota_exceeded {
            warn!("API quota was exceeded. Run again later to continue processing.");
            RunStatus::QuotaExceeded
        } else if outcome.remaining() > 0 {
            info!(
                "{} videos still pending. Run again to continue.",
                outcome.remaining()
            );
            RunStatus::Incomplete
        } else {
            info!("All videos have been processed successfully!");
            RunStatus::Complete
        };

        Ok(EnrichRunReport {
            outcome,
            status,
            output_file: output.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_summary_counts_distinct_ids() {
        let mut table = Table::new([VIDEO_ID_COLUMN]);
        for id in ["a", "b", "a", "\"c\"", ""] {
            table.push_row(vec![id.to_string()]);
        }
        let checkpoint = CheckpointState::from_ids(["a", "c", "zzz"]);
        let summary = progress_summary(&table, &checkpoint).unwrap();
        assert_eq!(summary.total_ids, 3);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.remaining, 1);
        assert!((summary.percent_complete - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_progress_summary_of_empty_table_is_complete() {
        let table = Table::new([VIDEO_ID_COLUMN]);
        let summary = progress_summary(&table, &CheckpointState::new()).unwrap();
        assert_eq!(summary.percent_complete, 100.0);
    }
}
