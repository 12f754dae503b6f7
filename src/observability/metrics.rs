/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Histogram, HistogramOpts, Registry, register_counter_with_registry,
    register_histogram_with_registry,
};

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub items_fetched: Counter,
    pub items_assigned: Counter,
    pub items_failed: Counter,
    pub items_skipped: Counter,
    pub items_without_tags: Counter,
    pub duplicate_conflicts: Counter,
    pub classification_attempts: Counter,
    pub classification_retries: Counter,
    pub failure_log_marked: Counter,

    // ヒストグラム
    pub classification_duration: Histogram,
    pub run_duration: Histogram,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名のメトリクスが既に登録されている場合はエラーを返す。
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            items_fetched: register_counter_with_registry!(
                "feed_tagger_items_fetched_total",
                "Total number of feed items fetched for tagging",
                registry
            )?,
            items_assigned: register_counter_with_registry!(
                "feed_tagger_items_assigned_total",
                "Total number of feed items whose tags were accepted",
                registry
            )?,
            items_failed: register_counter_with_registry!(
                "feed_tagger_items_failed_total",
                "Total number of feed items recorded in the failure log",
                registry
            )?,
            items_skipped: register_counter_with_registry!(
                "feed_tagger_items_skipped_total",
                "Total number of feed items skipped for a missing subject id",
                registry
            )?,
            items_without_tags: register_counter_with_registry!(
                "feed_tagger_items_without_tags_total",
                "Total number of feed items for which no catalog tag matched",
                registry
            )?,
            duplicate_conflicts: register_counter_with_registry!(
                "feed_tagger_duplicate_conflicts_total",
                "Total number of items skipped because the assignment already existed",
                registry
            )?,
            classification_attempts: register_counter_with_registry!(
                "feed_tagger_classification_attempts_total",
                "Total number of classification provider calls",
                registry
            )?,
            classification_retries: register_counter_with_registry!(
                "feed_tagger_classification_retries_total",
                "Total number of classification retries",
                registry
            )?,
            failure_log_marked: register_counter_with_registry!(
                "feed_tagger_failure_log_marked_total",
                "Total number of failure log entries marked processed",
                registry
            )?,
            classification_duration: register_histogram_with_registry!(
                HistogramOpts::new(
                    "feed_tagger_classification_duration_seconds",
                    "Duration of a single classification provider call",
                )
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
                registry
            )?,
            run_duration: register_histogram_with_registry!(
                "feed_tagger_run_duration_seconds",
                "Duration of a complete tagging run",
                registry
            )?,
        })
    }
}
