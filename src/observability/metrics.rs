//! Metrics for the normalize and enrich phases.
//!
//! Recording goes through the `metrics` facade, so every call is a no-op
//! until [`init`] installs the Prometheus recorder. The rendered exposition
//! can be written out at the end of a run with [`render`].

use std::sync::OnceLock;
use tracing::{debug, info};

static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Stable metric names, one place to look them up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    NormalizeRowsRead,
    NormalizeRowsKept,
    NormalizeDateParseFailures,
    EnrichBatchesSuccess,
    EnrichBatchesTransientError,
    EnrichBatchesDeferred,
    EnrichQuotaExceeded,
    EnrichIdsEnriched,
    EnrichIdsMissing,
    EnrichRequestDuration,
    CheckpointSaves,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::NormalizeRowsRead => "trending_normalize_rows_read_total",
            MetricName::NormalizeRowsKept => "trending_normalize_rows_kept_total",
            MetricName::NormalizeDateParseFailures => "trending_normalize_date_parse_failures_total",
            MetricName::EnrichBatchesSuccess => "trending_enrich_batches_success_total",
            MetricName::EnrichBatchesTransientError => "trending_enrich_batches_transient_error_total",
            MetricName::EnrichBatchesDeferred => "trending_enrich_batches_deferred_total",
            MetricName::EnrichQuotaExceeded => "trending_enrich_quota_exceeded_total",
            MetricName::EnrichIdsEnriched => "trending_enrich_ids_enriched_total",
            MetricName::EnrichIdsMissing => "trending_enrich_ids_missing_total",
            MetricName::EnrichRequestDuration => "trending_enrich_request_duration_seconds",
            MetricName::CheckpointSaves => "trending_checkpoint_saves_total",
        }
    }
}

/// Install the Prometheus recorder. Calling it twice is harmless.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics recorder installed");
    Ok(())
}

/// Prometheus text exposition of everything recorded so far
pub fn render() -> Option<String> {
    let rendered = METRICS_HANDLE.get().map(|handle| handle.render());
    if rendered.is_none() {
        debug!("Metrics requested but no recorder is installed");
    }
    rendered
}

pub mod normalize {
    use super::MetricName;

    pub fn rows_read(count: usize) {
        ::metrics::counter!(MetricName::NormalizeRowsRead.as_str()).increment(count as u64);
    }

    pub fn rows_kept(count: usize) {
        ::metrics::counter!(MetricName::NormalizeRowsKept.as_str()).increment(count as u64);
    }

    pub fn date_parse_failures(count: usize) {
        ::metrics::counter!(MetricName::NormalizeDateParseFailures.as_str())
            .increment(count as u64);
    }
}

pub mod enrich {
    use super::MetricName;

    pub fn batch_success(enriched: usize, missing: usize) {
        ::metrics::counter!(MetricName::EnrichBatchesSuccess.as_str()).increment(1);
        ::metrics::counter!(MetricName::EnrichIdsEnriched.as_str()).increment(enriched as u64);
        ::metrics::counter!(MetricName::EnrichIdsMissing.as_str()).increment(missing as u64);
    }

    pub fn transient_error() {
        ::metrics::counter!(MetricName::EnrichBatchesTransientError.as_str()).increment(1);
    }

    pub fn batch_deferred() {
        ::metrics::counter!(MetricName::EnrichBatchesDeferred.as_str()).increment(1);
    }

    pub fn quota_exceeded() {
        ::metrics::counter!(MetricName::EnrichQuotaExceeded.as_str()).increment(1);
    }

    pub fn request_duration(secs: f64) {
        ::metrics::histogram!(MetricName::EnrichRequestDuration.as_str()).record(secs);
    }
}

pub mod checkpoint {
    use super::MetricName;

    pub fn saved() {
        ::metrics::counter!(MetricName::CheckpointSaves.as_str()).increment(1);
    }
}
