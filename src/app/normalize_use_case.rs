use crate::common::error::Result;
use crate::observability::metrics;
use crate::pipeline::processing::normalize::{
    DatasetNormalizer, DateWindow, NormalizeStats, Normalizer,
};
use crate::pipeline::storage::{CsvOptions, Table};
use std::path::Path;
use tracing::{info, instrument};

/// Use case for turning the raw trending export into the cleaned table
pub struct NormalizeUseCase {
    normalizer: Box<dyn Normalizer + Send + Sync>,
    csv_options: CsvOptions,
}

impl NormalizeUseCase {
    pub fn new(normalizer: Box<dyn Normalizer + Send + Sync>, csv_options: CsvOptions) -> Self {
        Self {
            normalizer,
            csv_options,
        }
    }

    /// Create a use case with the stock dataset normalizer
    pub fn with_default_normalizer(window: DateWindow, csv_options: CsvOptions) -> Self {
        Self::new(Box::new(DatasetNormalizer::new(window)), csv_options)
    }

    /// Normalize an in-memory table
    pub fn normalize_table(&self, table: Table) -> Result<(Table, NormalizeStats)> {
        let (table, stats) = self.normalizer.normalize(table)?;
        metrics::normalize::rows_read(stats.rows_read);
        metrics::normalize::rows_kept(stats.rows_kept);
        metrics::normalize::date_parse_failures(stats.unparseable_dates);
        Ok((table, stats))
    }

    /// Read `input`, normalize it and write the cleaned table to `output`
    #[instrument(skip(self), fields(input = %input.display(), output = %output.display()))]
    pub fn run(&self, input: &Path, output: &Path) -> Result<NormalizeStats> {
        info!("Reading data from {}...", input.display());
        let table = Table::read_csv(input, &self.csv_options)?;
        info!(
            "Original data shape: ({}, {})",
            table.len(),
            table.headers().len()
        );

        let (cleaned, stats) = self.normalize_table(table)?;
        info!(
            "Filtered data shape: ({}, {}) - kept {:.1}% of rows, {} unparseable dates",
            cleaned.len(),
            cleaned.headers().len(),
            stats.kept_rate(),
            stats.unparseable_dates
        );

        cleaned.write_csv(output)?;
        info!("Processed data saved to {}", output.display());
        Ok(stats)
    }
}
