//! Dataset normalization: derive the description flag and tag count, then
//! keep only rows whose trending date falls inside the window.

mod trending_date;

pub use trending_date::{DateWindow, TrendingDate};

use crate::common::constants::{
    DESCRIPTION_ABSENT, DESCRIPTION_COLUMN, DESCRIPTION_PRESENT, NO_TAGS_SENTINEL, TAGS_COLUMN,
    TRENDING_DATE_COLUMN,
};
use crate::common::error::Result;
use crate::pipeline::storage::Table;
use serde::Serialize;
use tracing::{debug, info};

/// Counts reported after a normalization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub unparseable_dates: usize,
    pub aware_dates: usize,
    pub naive_dates: usize,
    pub with_description: usize,
}

impl NormalizeStats {
    pub fn rows_dropped(&self) -> usize {
        self.rows_read - self.rows_kept
    }

    /// Share of input rows kept, as a percentage
    pub fn kept_rate(&self) -> f64 {
        if self.rows_read == 0 {
            return 0.0;
        }
        self.rows_kept as f64 / self.rows_read as f64 * 100.0
    }
}

/// Trait for turning a raw trending table into its cleaned form
pub trait Normalizer {
    fn normalize(&self, table: Table) -> Result<(Table, NormalizeStats)>;
}

/// Empty cells are null in a CSV table
fn non_null(cell: &str) -> Option<&str> {
    if cell.is_empty() {
        None
    } else {
        Some(cell)
    }
}

/// True iff the description has non-whitespace content
pub fn description_present(raw: Option<&str>) -> bool {
    raw.map(|s| !s.trim().is_empty()).unwrap_or(false)
}

/// Number of `|`-separated tags; null, empty and `[None]` count as zero
pub fn tag_count(raw: Option<&str>) -> usize {
    let tags = match raw {
        None => return 0,
        Some(t) if t.is_empty() || t == NO_TAGS_SENTINEL => return 0,
        Some(t) => t,
    };
    if tags.contains('|') {
        return tags.split('|').count();
    }
    if tags.trim().is_empty() {
        0
    } else {
        1
    }
}

/// The stock normalizer for the trending dataset
#[derive(Debug, Clone)]
pub struct DatasetNormalizer {
    window: DateWindow,
}

impl DatasetNormalizer {
    pub fn new(window: DateWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &DateWindow {
        &self.window
    }
}

impl Normalizer for DatasetNormalizer {
    fn normalize(&self, mut table: Table) -> Result<(Table, NormalizeStats)> {
        let description_col = table.require_column(DESCRIPTION_COLUMN)?;
        let tags_col = table.require_column(TAGS_COLUMN)?;
        let date_col = table.require_column(TRENDING_DATE_COLUMN)?;

        let mut stats = NormalizeStats {
            rows_read: table.len(),
            ..Default::default()
        };

        info!("Modifying description column...");
        table.map_column(description_col, |cell| {
            if description_present(non_null(cell)) {
                DESCRIPTION_PRESENT.to_string()
            } else {
                DESCRIPTION_ABSENT.to_string()
            }
        });
        stats.with_description = table
            .column(description_col)
            .filter(|c| *c == DESCRIPTION_PRESENT)
            .count();

        info!("Converting tags to tag count...");
        table.map_column(tags_col, |cell| tag_count(non_null(cell)).to_string());

        info!("Filtering by trending date...");
        let window = self.window;
        table.retain_rows(|row| match TrendingDate::parse(&row[date_col]) {
            Some(date) => {
                if date.is_aware() {
                    stats.aware_dates += 1;
                } else {
                    stats.naive_dates += 1;
                }
                window.contains(&date)
            }
            None => {
                debug!("Unparseable trending date '{}', dropping row", row[date_col]);
                stats.unparseable_dates += 1;
                false
            }
        });
        stats.rows_kept = table.len();

        if stats.aware_dates > 0 && stats.naive_dates > 0 {
            info!(
                "Trending dates mix offset-aware ({}) and naive ({}) values; each row is compared on its own wall clock",
                stats.aware_dates, stats.naive_dates
            );
        }

        Ok((table, stats))
    }
}
