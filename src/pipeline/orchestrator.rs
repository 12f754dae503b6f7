/// タグ付け実行のオーケストレーター。
///
/// 期間指定（新規フィード）と失敗ログ再処理の2つの入口を持ち、どちらも
/// 同じアイテム単位の状態遷移を通って [`RunReport`] に集約される。
/// アイテム単位の失敗は実行を止めず、失敗ログへの書き込み失敗だけが実行を中断する。
use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{Instrument, info, info_span, warn};

use crate::error::{TaggingError, is_duplicate_conflict};
use crate::observability::metrics::Metrics;
use crate::store::{FailureLogDao, NewFailureLog};

use super::assigner::TagAssigner;
use super::model::{
    FeedItem, FeedQuery, SubmissionOutcome, TagAssignment, TagAssignmentRecord,
    TagAssignmentRequest, TagCatalogEntry,
};
use super::normalize::TextNormalizer;
use super::outcome::{ItemOutcome, NothingToDo, RunOutcome, RunReport, RunSource};
use super::pii::PiiMasker;

/// フィードサービスとの境界。
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// 割り当て可能なタグのカタログ。
    async fn fetch_tags(&self) -> Result<Vec<TagCatalogEntry>>;

    /// 期間内のフィードアイテム（取得順）。
    async fn fetch_feeds(&self, query: &FeedQuery) -> Result<Vec<FeedItem>>;

    /// 1アイテム分のタグをまとめて提出し、タグごとの結果を返す。
    async fn assign_tags_batch(
        &self,
        subject_id: i64,
        requests: &[TagAssignmentRequest],
    ) -> Result<Vec<SubmissionOutcome>>;

    /// 既に処理済みの最新日。まだ無ければ `None`。
    async fn latest_for_date(&self) -> Result<Option<NaiveDate>>;
}

/// フィード取得時のクエリ設定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub limit: u32,
    pub filter_new: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            limit: 100,
            filter_new: true,
        }
    }
}

pub struct TaggingOrchestrator {
    feed: Arc<dyn FeedSource>,
    failure_log: Arc<dyn FailureLogDao>,
    masker: Arc<PiiMasker>,
    normalizer: TextNormalizer,
    assigner: TagAssigner,
    metrics: Arc<Metrics>,
    fetch: FetchSettings,
}

impl TaggingOrchestrator {
    #[must_use]
    pub fn new(
        feed: Arc<dyn FeedSource>,
        failure_log: Arc<dyn FailureLogDao>,
        masker: Arc<PiiMasker>,
        normalizer: TextNormalizer,
        assigner: TagAssigner,
        metrics: Arc<Metrics>,
        fetch: FetchSettings,
    ) -> Self {
        Self {
            feed,
            failure_log,
            masker,
            normalizer,
            assigner,
            metrics,
            fetch,
        }
    }

    /// 最新処理日を問い合わせる（実行期間の決定用）。
    ///
    /// # Errors
    /// フィードサービスへの問い合わせに失敗した場合は [`TaggingError::Transport`] を返す。
    pub async fn latest_for_date(&self) -> Result<Option<NaiveDate>, TaggingError> {
        self.feed
            .latest_for_date()
            .await
            .map_err(|error| TaggingError::transport("latest-for-date", error))
    }

    /// 期間内の新規フィードを処理する。
    ///
    /// # Errors
    /// カタログ・フィード取得の通信失敗、または失敗ログへの書き込み失敗で実行全体を中断する。
    pub async fn run_window(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RunOutcome, TaggingError> {
        if start > end {
            info!(%start, %end, "window is not open yet");
            return Ok(RunOutcome::NothingToDo(NothingToDo::WindowNotOpen {
                start,
                end,
            }));
        }
        let source = RunSource::Window { start, end };
        let span = info_span!("tagging_run", %source);
        self.window_inner(source, start, end).instrument(span).await
    }

    async fn window_inner(
        &self,
        source: RunSource,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RunOutcome, TaggingError> {
        let Some(catalog) = self.load_catalog().await? else {
            return Ok(RunOutcome::NothingToDo(NothingToDo::EmptyCatalog));
        };

        let query = FeedQuery {
            start,
            end,
            filter_new: self.fetch.filter_new,
            limit: self.fetch.limit,
        };
        let items = self
            .feed
            .fetch_feeds(&query)
            .await
            .map_err(|error| TaggingError::transport("feed fetch", error))?;
        if items.is_empty() {
            info!("no feed items in window");
            return Ok(RunOutcome::NothingToDo(NothingToDo::EmptyWindow));
        }

        let report = self.process_items(source, items, &catalog).await?;
        Ok(RunOutcome::Completed(report))
    }

    /// 未処理の失敗ログを再処理する。
    ///
    /// # Errors
    /// 失敗ログの読み書き、またはカタログ取得の通信失敗で実行全体を中断する。
    pub async fn run_replay(&self) -> Result<RunOutcome, TaggingError> {
        let span = info_span!("tagging_run", source = %RunSource::Replay);
        self.replay_inner().instrument(span).await
    }

    async fn replay_inner(&self) -> Result<RunOutcome, TaggingError> {
        let entries = self
            .failure_log
            .list_unprocessed()
            .await
            .map_err(|error| TaggingError::persistence("list_unprocessed", error))?;
        if entries.is_empty() {
            info!("no unprocessed failure log entries");
            return Ok(RunOutcome::NothingToDo(NothingToDo::NoPendingFailures));
        }

        let Some(catalog) = self.load_catalog().await? else {
            return Ok(RunOutcome::NothingToDo(NothingToDo::EmptyCatalog));
        };

        let items = entries.iter().map(FeedItem::from_failure).collect();
        let report = self.process_items(RunSource::Replay, items, &catalog).await?;
        Ok(RunOutcome::Completed(report))
    }

    async fn load_catalog(&self) -> Result<Option<Vec<TagCatalogEntry>>, TaggingError> {
        let catalog = self
            .feed
            .fetch_tags()
            .await
            .map_err(|error| TaggingError::transport("tag catalog fetch", error))?;
        if catalog.is_empty() {
            warn!("tag catalog is empty");
            return Ok(None);
        }
        Ok(Some(catalog))
    }

    #[allow(clippy::cast_precision_loss)]
    async fn process_items(
        &self,
        source: RunSource,
        items: Vec<FeedItem>,
        catalog: &[TagCatalogEntry],
    ) -> Result<RunReport, TaggingError> {
        let started = Instant::now();
        self.metrics.items_fetched.inc_by(items.len() as f64);
        info!(items = items.len(), catalog = catalog.len(), "processing items");

        let mut report = RunReport::new(source);
        for item in items {
            let outcome = self.process_item(&item, catalog).await?;
            report.outcomes.push(outcome);
        }

        self.metrics
            .run_duration
            .observe(started.elapsed().as_secs_f64());
        info!(
            assigned = report.assigned_count(),
            failed = report.failed_count(),
            duplicates = report.duplicate_count(),
            no_tag = report.no_tag_count(),
            skipped = report.skipped_count(),
            "run finished"
        );
        Ok(report)
    }

    async fn process_item(
        &self,
        item: &FeedItem,
        catalog: &[TagCatalogEntry],
    ) -> Result<ItemOutcome, TaggingError> {
        let Some(subject_id) = item.subject_id else {
            warn!(for_date = %item.for_date, "{}, skipping", TaggingError::MissingIdentifier);
            self.metrics.items_skipped.inc();
            return Ok(ItemOutcome::Skipped);
        };

        let masked = self.masker.mask(&item.message);
        let cleaned = self.normalizer.clean(&masked);

        let outcome = match self.assigner.assign(subject_id, &cleaned, catalog).await {
            Ok(assignment) if assignment.tag_codes.is_empty() => {
                info!(
                    subject_id,
                    failure_id = ?item.failure_id,
                    "no tag matched, nothing to submit"
                );
                self.metrics.items_without_tags.inc();
                ItemOutcome::NoTagMatched {
                    subject_id,
                    failure_id: item.failure_id,
                }
            }
            Ok(assignment) => self.submit(item, &masked, assignment).await?,
            Err(error) => {
                self.resolve_failure(item, subject_id, &masked, anyhow::Error::new(error))
                    .await?
            }
        };

        if let Some(failure_id) = item.failure_id {
            self.mark_processed(failure_id).await?;
        }
        Ok(outcome)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn submit(
        &self,
        item: &FeedItem,
        masked: &str,
        assignment: TagAssignment,
    ) -> Result<ItemOutcome, TaggingError> {
        let subject_id = assignment.subject_id;
        let requests: Vec<TagAssignmentRequest> = assignment
            .tag_codes
            .iter()
            .map(|code| TagAssignmentRequest::unscored(code.as_str(), item.for_date))
            .collect();

        let results = match self.feed.assign_tags_batch(subject_id, &requests).await {
            Ok(results) => results,
            Err(error) => {
                let error =
                    error.context(format!("tag-assign-batch failed for subject {subject_id}"));
                return self.resolve_failure(item, subject_id, masked, error).await;
            }
        };

        let mut records: Vec<TagAssignmentRecord> = Vec::with_capacity(results.len());
        let mut duplicate_tags = Vec::new();
        for result in results {
            match result {
                SubmissionOutcome::Accepted(record) => records.push(record),
                SubmissionOutcome::DuplicateRejected { tag_code } => duplicate_tags.push(tag_code),
            }
        }
        if !duplicate_tags.is_empty() {
            self.metrics
                .duplicate_conflicts
                .inc_by(duplicate_tags.len() as f64);
        }

        if records.is_empty() {
            if duplicate_tags.is_empty() {
                let error = anyhow::anyhow!(
                    "feed service returned no results for {} submitted tags",
                    requests.len()
                );
                return self.resolve_failure(item, subject_id, masked, error).await;
            }
            info!(
                subject_id,
                failure_id = ?item.failure_id,
                ?duplicate_tags,
                "all tags were duplicates"
            );
            return Ok(ItemOutcome::DuplicateSkipped {
                subject_id,
                failure_id: item.failure_id,
                tag_codes: duplicate_tags,
            });
        }

        self.metrics.items_assigned.inc();
        info!(
            subject_id,
            failure_id = ?item.failure_id,
            tag_count = records.len(),
            duplicates = duplicate_tags.len(),
            "tags assigned"
        );
        Ok(ItemOutcome::Assigned {
            subject_id,
            failure_id: item.failure_id,
            records,
            duplicate_tags,
        })
    }

    /// 重複なら記録せずにスキップし、それ以外は失敗ログへ追記する。
    async fn resolve_failure(
        &self,
        item: &FeedItem,
        subject_id: i64,
        masked: &str,
        error: anyhow::Error,
    ) -> Result<ItemOutcome, TaggingError> {
        if is_duplicate_conflict(&error) {
            self.metrics.duplicate_conflicts.inc();
            info!(
                subject_id,
                failure_id = ?item.failure_id,
                error = %format!("{error:#}"),
                "duplicate conflict, not logging"
            );
            return Ok(ItemOutcome::DuplicateSkipped {
                subject_id,
                failure_id: item.failure_id,
                tag_codes: Vec::new(),
            });
        }

        let error_message = format!("{error:#}");
        let entry = self
            .failure_log
            .insert(&NewFailureLog {
                subject_id,
                message: masked.to_string(),
                for_date: item.for_date,
                error_message: error_message.clone(),
            })
            .await
            .context("recording tag assignment failure")
            .map_err(|source| TaggingError::persistence("insert", source))?;

        self.metrics.items_failed.inc();
        warn!(
            subject_id,
            failure_id = ?item.failure_id,
            log_id = entry.id,
            error = %error_message,
            "tag assignment failed, logged for retry"
        );
        Ok(ItemOutcome::Failed {
            subject_id,
            failure_id: item.failure_id,
            log_id: entry.id,
            error: error_message,
        })
    }

    async fn mark_processed(&self, failure_id: i64) -> Result<(), TaggingError> {
        let updated = self
            .failure_log
            .mark_processed(failure_id)
            .await
            .map_err(|error| TaggingError::persistence("mark_processed", error))?;
        if updated {
            self.metrics.failure_log_marked.inc();
        } else {
            warn!(failure_id, "failure log entry vanished before it could be marked");
        }
        Ok(())
    }
}
