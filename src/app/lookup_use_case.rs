use crate::app::ports::{FetchError, VideoMetadataPort};
use crate::common::constants::{LANGUAGE_COLUMN, LENGTH_COLUMN, VIDEO_ID_COLUMN};
use crate::common::types::{IdSource, VideoMetadata};
use crate::pipeline::processing::enrich::{fetch_all, EnrichConfig};
use crate::pipeline::storage::Table;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of resolving and fetching an ad-hoc list of videos
#[derive(Debug, Clone, Default)]
pub struct LookupReport {
    pub items: Vec<VideoMetadata>,
    /// Names that search could not map to a video
    pub unresolved_names: Vec<String>,
    /// IDs whose batch failed after all retries
    pub deferred_ids: Vec<String>,
    /// IDs that were requested but not returned
    pub not_found_ids: Vec<String>,
    pub quota_exceeded: bool,
}

impl LookupReport {
    /// Results as a table with the same column names the enrichment run uses
    pub fn to_table(&self) -> Table {
        let mut table = Table::new([VIDEO_ID_COLUMN, LANGUAGE_COLUMN, LENGTH_COLUMN]);
        for item in &self.items {
            table.push_row(vec![
                item.id.clone(),
                item.language.clone(),
                item.duration_seconds.to_string(),
            ]);
        }
        table
    }
}

/// Use case for fetching metadata for IDs given directly or found by name
pub struct LookupUseCase {
    port: Arc<dyn VideoMetadataPort>,
    config: EnrichConfig,
}

impl LookupUseCase {
    pub fn new(port: Arc<dyn VideoMetadataPort>, config: EnrichConfig) -> Self {
        Self { port, config }
    }

    #[instrument(skip(self, source), fields(inputs = source.len()))]
    pub async fn run(&self, source: IdSource) -> LookupReport {
        let mut report = LookupReport::default();

        let ids = match source {
            IdSource::Ids(ids) => ids,
            IdSource::Names(names) => {
                let mut ids = Vec::with_capacity(names.len());
                for name in names {
                    match self.port.search_video_id(&name).await {
                        Ok(Some(id)) => {
                            info!("Resolved '{}' to {}", name, id);
                            ids.push(id);
                        }
                        Ok(None) => {
                            warn!("No video found for '{}'", name);
                            report.unresolved_names.push(name);
                        }
                        Err(FetchError::QuotaExceeded(message)) => {
                            warn!("Quota exceeded while searching: {}", message);
                            report.quota_exceeded = true;
                            report.unresolved_names.push(name);
                            return report;
                        }
                        Err(FetchError::Transient(message)) => {
                            warn!("Search for '{}' failed: {}", name, message);
                            report.unresolved_names.push(name);
                        }
                    }
                    tokio::time::sleep(self.config.pacing).await;
                }
                ids
            }
        };

        let mut seen = std::collections::HashSet::new();
        let ids: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();

        let fetched = fetch_all(self.port.as_ref(), &ids, &self.config).await;
        let returned: std::collections::HashSet<&str> =
            fetched.items.iter().map(|item| item.id.as_str()).collect();
        report.not_found_ids = ids
            .iter()
            .filter(|id| !returned.contains(id.as_str()) && !fetched.deferred_ids.contains(id))
            .cloned()
            .collect();
        if fetched.quota_exceeded {
            report.quota_exceeded = true;
        }
        report.items = fetched.items;
        report.deferred_ids = fetched.deferred_ids;

        info!(
            "Looked up {} videos: {} found, {} not found, {} deferred",
            ids.len(),
            report.items.len(),
            report.not_found_ids.len(),
            report.deferred_ids.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ChartEntry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct NameEndpoint {
        names: HashMap<String, String>,
    }

    #[async_trait]
    impl VideoMetadataPort for NameEndpoint {
        async fn videos_by_id(&self, ids: &[String]) -> Result<Vec<VideoMetadata>, FetchError> {
            Ok(ids
                .iter()
                .filter(|id| id.as_str() != "gone")
                .map(|id| VideoMetadata {
                    id: id.clone(),
                    language: "fr".to_string(),
                    duration_seconds: 42,
                })
                .collect())
        }

        async fn search_video_id(&self, name: &str) -> Result<Option<String>, FetchError> {
            if name == "quota" {
                return Err(FetchError::QuotaExceeded("search quota".to_string()));
            }
            Ok(self.names.get(name).cloned())
        }

        async fn most_popular(&self, _region: &str, _max: u32) -> Result<Vec<ChartEntry>, FetchError> {
            Ok(Vec::new())
        }
    }

    fn use_case() -> LookupUseCase {
        let names = [("song one", "id1"), ("song two", "id2"), ("dupe", "id1")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = EnrichConfig {
            batch_size: 50,
            pacing: Duration::ZERO,
            backoff: Duration::ZERO,
            max_retries: 0,
        };
        LookupUseCase::new(Arc::new(NameEndpoint { names }), config)
    }

    #[tokio::test]
    async fn test_names_resolve_through_search() {
        let source = IdSource::Names(vec![
            "song one".to_string(),
            "missing".to_string(),
            "song two".to_string(),
            "dupe".to_string(),
        ]);
        let report = use_case().run(source).await;
        let ids: Vec<&str> = report.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["id1", "id2"]);
        assert_eq!(report.unresolved_names, vec!["missing".to_string()]);
        assert!(!report.quota_exceeded);
    }

    #[tokio::test]
    async fn test_direct_ids_report_not_found() {
        let source = IdSource::Ids(vec!["x".to_string(), "gone".to_string()]);
        let report = use_case().run(source).await;
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.not_found_ids, vec!["gone".to_string()]);

        let table = report.to_table();
        assert_eq!(table.headers(), &[VIDEO_ID_COLUMN, LANGUAGE_COLUMN, LENGTH_COLUMN]);
        assert_eq!(table.rows()[0], vec!["x", "fr", "42"]);
    }

    #[tokio::test]
    async fn test_quota_during_search_stops_lookup() {
        let source = IdSource::Names(vec!["song one".to_string(), "quota".to_string()]);
        let report = use_case().run(source).await;
        assert!(report.quota_exceeded);
        assert!(report.items.is_empty());
    }
}
