//! Tracing setup and metric counters
//!
//! Counters are always emitted through the `metrics` facade; they are only
//! collected when a recorder is installed (the `prometheus` feature).

use std::sync::OnceLock;

use metrics::counter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;
use crate::models::{ResourceCounter, VoteOutcome, VoteTarget};

const VOTES_TOTAL: &str = "campus_share_votes_total";
const RATINGS_TOTAL: &str = "campus_share_ratings_total";
const COUNTER_INCREMENTS_TOTAL: &str = "campus_share_counter_increments_total";
const COUNTER_MISSES_TOTAL: &str = "campus_share_counter_misses_total";
const RECOMMENDATIONS_TOTAL: &str = "campus_share_recommendations_total";
const RECOMMENDATION_BACKFILL_TOTAL: &str = "campus_share_recommendation_backfill_total";
const CATALOG_QUERIES_TOTAL: &str = "campus_share_catalog_queries_total";

#[cfg(feature = "prometheus")]
static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

#[cfg(not(feature = "prometheus"))]
static METRICS_HANDLE: OnceLock<()> = OnceLock::new();

/// Initialize tracing with env filter
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,campus_share=debug,tower_http=info,sqlx=warn")
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(std::env::var("NO_COLOR").is_err()),
            )
            .init(),
    }
}

/// Install the Prometheus recorder. A no-op without the `prometheus` feature.
#[cfg(feature = "prometheus")]
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
pub fn init_metrics() -> anyhow::Result<()> {
    let _ = METRICS_HANDLE.set(());
    Ok(())
}

/// Prometheus text exposition, `None` when no recorder is installed
#[cfg(feature = "prometheus")]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE
        .get()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
}

#[cfg(not(feature = "prometheus"))]
pub fn render_metrics() -> Option<String> {
    None
}

pub fn register_vote(target: VoteTarget, outcome: VoteOutcome) {
    counter!(
        VOTES_TOTAL,
        "target" => target.entity_name(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn register_rating(value: i32) {
    counter!(RATINGS_TOTAL, "value" => value.to_string()).increment(1);
}

pub fn register_counter_increment(counter_kind: &'static str, applied: bool) {
    if applied {
        counter!(COUNTER_INCREMENTS_TOTAL, "counter" => counter_kind).increment(1);
    } else {
        counter!(COUNTER_MISSES_TOTAL, "counter" => counter_kind).increment(1);
    }
}

pub fn resource_counter_label(counter_kind: ResourceCounter) -> &'static str {
    match counter_kind {
        ResourceCounter::View => "resource_view",
        ResourceCounter::Download => "resource_download",
    }
}

pub fn register_recommendation(kind: &'static str, tier: &'static str, returned: usize) {
    counter!(RECOMMENDATIONS_TOTAL, "kind" => kind, "tier" => tier).increment(1);
    tracing::trace!(kind, tier, returned, "recommendation served");
}

pub fn register_backfill(filled: usize) {
    counter!(RECOMMENDATION_BACKFILL_TOTAL).increment(filled as u64);
}

pub fn register_catalog_query(sort: &'static str) {
    counter!(CATALOG_QUERIES_TOTAL, "sort" => sort).increment(1);
}
