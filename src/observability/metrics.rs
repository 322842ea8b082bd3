//! Metrics for the refinery, recorded through the `metrics` facade.
//!
//! Without an installed recorder every call is a no-op, so library code and tests can record
//! freely. The `serve` command installs a Prometheus exporter when a metrics port is configured.

use std::fmt;
use std::net::SocketAddr;
use tracing::{info, warn};

/// All metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Normalize metrics
    NormalizeRecordsProcessed,
    NormalizeRatingsImputed,

    // Refine metrics
    RefineRecordsRefined,
    RefineRecordsFailed,
    RefineSentimentFallbacks,
    RefineMaskingFallbacks,
    RefineReward,
    RefineTablePersistFailures,
    RefineBatchesProcessed,
    RefineBatchSize,
    RefineBatchDuration,

    // Artifact metrics
    ArtifactsWritten,
    ArtifactsWriteErrors,

    // HTTP metrics
    HttpRequests,
    HttpRateLimited,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::NormalizeRecordsProcessed => "refinery_normalize_records_processed_total",
            MetricName::NormalizeRatingsImputed => "refinery_normalize_ratings_imputed_total",

            MetricName::RefineRecordsRefined => "refinery_refine_records_refined_total",
            MetricName::RefineRecordsFailed => "refinery_refine_records_failed_total",
            MetricName::RefineSentimentFallbacks => "refinery_refine_sentiment_fallbacks_total",
            MetricName::RefineMaskingFallbacks => "refinery_refine_masking_fallbacks_total",
            MetricName::RefineReward => "refinery_refine_reward",
            MetricName::RefineTablePersistFailures => "refinery_refine_table_persist_failures_total",
            MetricName::RefineBatchesProcessed => "refinery_refine_batches_processed_total",
            MetricName::RefineBatchSize => "refinery_refine_batch_size",
            MetricName::RefineBatchDuration => "refinery_refine_batch_duration_seconds",

            MetricName::ArtifactsWritten => "refinery_artifacts_written_total",
            MetricName::ArtifactsWriteErrors => "refinery_artifacts_write_errors_total",

            MetricName::HttpRequests => "refinery_http_requests_total",
            MetricName::HttpRateLimited => "refinery_http_rate_limited_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            NormalizeRecordsProcessed,
            NormalizeRatingsImputed,
            RefineRecordsRefined,
            RefineRecordsFailed,
            RefineSentimentFallbacks,
            RefineMaskingFallbacks,
            RefineReward,
            RefineTablePersistFailures,
            RefineBatchesProcessed,
            RefineBatchSize,
            RefineBatchDuration,
            ArtifactsWritten,
            ArtifactsWriteErrors,
            HttpRequests,
            HttpRateLimited,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Install the Prometheus exporter listening on `port`.
pub fn init(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn batch_normalized(records: usize, imputed: usize) {
        ::metrics::counter!(MetricName::NormalizeRecordsProcessed.as_str()).increment(records as u64);
        ::metrics::counter!(MetricName::NormalizeRatingsImputed.as_str()).increment(imputed as u64);
    }
}

pub mod refine {
    use super::MetricName;

    pub fn record_refined() {
        ::metrics::counter!(MetricName::RefineRecordsRefined.as_str()).increment(1);
    }

    pub fn record_failed(persistence: bool) {
        let kind = if persistence { "persistence" } else { "other" };
        ::metrics::counter!(MetricName::RefineRecordsFailed.as_str(), "kind" => kind).increment(1);
    }

    pub fn sentiment_fallback() {
        ::metrics::counter!(MetricName::RefineSentimentFallbacks.as_str()).increment(1);
    }

    pub fn masking_fallback() {
        ::metrics::counter!(MetricName::RefineMaskingFallbacks.as_str()).increment(1);
    }

    pub fn reward_recorded(reward: f64) {
        ::metrics::histogram!(MetricName::RefineReward.as_str()).record(reward);
    }

    pub fn table_persist_failed() {
        ::metrics::counter!(MetricName::RefineTablePersistFailures.as_str()).increment(1);
    }

    pub fn batch_processed(batch_size: usize, secs: f64) {
        ::metrics::counter!(MetricName::RefineBatchesProcessed.as_str()).increment(1);
        ::metrics::histogram!(MetricName::RefineBatchSize.as_str()).record(batch_size as f64);
        ::metrics::histogram!(MetricName::RefineBatchDuration.as_str()).record(secs);
    }
}

pub mod artifacts {
    use super::MetricName;

    pub fn artifact_written() {
        ::metrics::counter!(MetricName::ArtifactsWritten.as_str()).increment(1);
    }

    pub fn artifact_write_failed() {
        ::metrics::counter!(MetricName::ArtifactsWriteErrors.as_str()).increment(1);
    }
}

pub mod http {
    use super::MetricName;

    pub fn request(route: &'static str, status: u16) {
        ::metrics::counter!(
            MetricName::HttpRequests.as_str(),
            "route" => route,
            "status" => status.to_string()
        )
        .increment(1);
    }

    pub fn rate_limited() {
        ::metrics::counter!(MetricName::HttpRateLimited.as_str()).increment(1);
    }
}
