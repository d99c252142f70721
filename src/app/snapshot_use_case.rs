use crate::app::ports::VideoMetadataPort;
use crate::common::constants::{snapshot_headers, MAX_BATCH_SIZE};
use crate::common::error::Result;
use crate::common::types::ChartEntry;
use crate::pipeline::storage::Table;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument};

/// Use case for capturing the current most-popular chart as a dated table
pub struct SnapshotUseCase {
    port: Arc<dyn VideoMetadataPort>,
}

impl SnapshotUseCase {
    pub fn new(port: Arc<dyn VideoMetadataPort>) -> Self {
        Self { port }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, region_code: &str, max_results: u32, date: NaiveDate) -> Result<Table> {
        let max_results = max_results.clamp(1, MAX_BATCH_SIZE as u32);
        info!("Collecting chart data for {} ({})", date, region_code);
        let entries = self.port.most_popular(region_code, max_results).await?;
        info!("Chart returned {} videos", entries.len());
        Ok(chart_table(&entries, date))
    }
}

pub fn chart_table(entries: &[ChartEntry], date: NaiveDate) -> Table {
    let mut table = Table::new(snapshot_headers());
    let date = date.format("%Y-%m-%d").to_string();
    for entry in entries {
        table.push_row(vec![
            date.clone(),
            entry.id.clone(),
            entry.title.clone(),
            entry.channel.clone(),
            entry.duration_raw.clone(),
            entry.duration_seconds.to_string(),
            entry.views.to_string(),
            entry.likes.to_string(),
            entry.comments.to_string(),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_table_layout() {
        let entries = vec![ChartEntry {
            id: "abc".to_string(),
            title: "A, B".to_string(),
            channel: "Chan".to_string(),
            duration_raw: "PT1M5S".to_string(),
            duration_seconds: 65,
            views: 1000,
            likes: 10,
            comments: 0,
        }];
        let table = chart_table(&entries, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(table.headers()[0], "date");
        assert_eq!(
            table.rows()[0],
            vec!["2024-04-01", "abc", "A, B", "Chan", "PT1M5S", "65", "1000", "10", "0"]
        );
    }
}
