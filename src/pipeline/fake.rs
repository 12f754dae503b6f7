// テスト用のフィードサービス（提出内容と問い合わせを記録する）

use std::{collections::HashSet, sync::Arc, sync::Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use prometheus::Registry;

use crate::clients::llm::{ClassificationProvider, scripted::ScriptedProvider};
use crate::observability::metrics::Metrics;
use crate::store::{FailureLogDao, memory::InMemoryFailureLog};
use crate::util::retry::RetryConfig;

use super::assigner::TagAssigner;
use super::model::{
    FeedItem, FeedQuery, SubmissionOutcome, TagAssignmentRecord, TagAssignmentRequest,
    TagCatalogEntry,
};
use super::normalize::TextNormalizer;
use super::orchestrator::{FeedSource, FetchSettings, TaggingOrchestrator};
use super::pii::{DictionaryNameRecognizer, PiiMasker};

#[derive(Default)]
pub(crate) struct FakeFeed {
    pub(crate) tags: Vec<TagCatalogEntry>,
    pub(crate) items: Vec<FeedItem>,
    pub(crate) duplicate_codes: HashSet<String>,
    pub(crate) submit_error: Option<String>,
    pub(crate) fail_catalog: bool,
    pub(crate) latest: Option<NaiveDate>,
    submissions: Mutex<Vec<(i64, Vec<TagAssignmentRequest>)>>,
    queries: Mutex<Vec<FeedQuery>>,
}

impl FakeFeed {
    pub(crate) fn with_items(items: Vec<FeedItem>) -> Self {
        Self {
            tags: catalog(),
            items,
            ..Self::default()
        }
    }

    pub(crate) fn submissions(&self) -> Vec<(i64, Vec<TagAssignmentRequest>)> {
        self.submissions.lock().expect("lock").clone()
    }

    pub(crate) fn queries(&self) -> Vec<FeedQuery> {
        self.queries.lock().expect("lock").clone()
    }
}

pub(crate) fn catalog() -> Vec<TagCatalogEntry> {
    ["club", "event", "notice"]
        .into_iter()
        .map(|code| TagCatalogEntry {
            code: code.to_string(),
            label: code.to_string(),
            description: None,
            priority_weight: 1.0,
        })
        .collect()
}

/// 人名辞書に「김철수」だけを持つオーケストレーターを組み立てる。
pub(crate) fn fake_orchestrator(
    feed: &Arc<FakeFeed>,
    failure_log: &Arc<InMemoryFailureLog>,
    provider: &Arc<ScriptedProvider>,
) -> TaggingOrchestrator {
    let metrics = Arc::new(Metrics::new(&Registry::new()).expect("metrics"));
    let recognizer = DictionaryNameRecognizer::from_names(["김철수"]).expect("dictionary builds");
    TaggingOrchestrator::new(
        Arc::clone(feed) as Arc<dyn FeedSource>,
        Arc::clone(failure_log) as Arc<dyn FailureLogDao>,
        Arc::new(PiiMasker::standard(Arc::new(recognizer))),
        TextNormalizer::default(),
        TagAssigner::new(
            Arc::clone(provider) as Arc<dyn ClassificationProvider>,
            RetryConfig::default(),
            Arc::clone(&metrics),
        ),
        metrics,
        FetchSettings::default(),
    )
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn fetch_tags(&self) -> Result<Vec<TagCatalogEntry>> {
        if self.fail_catalog {
            bail!("feed service tag returned error status 503: unavailable");
        }
        Ok(self.tags.clone())
    }

    async fn fetch_feeds(&self, query: &FeedQuery) -> Result<Vec<FeedItem>> {
        self.queries.lock().expect("lock").push(*query);
        Ok(self.items.clone())
    }

    async fn assign_tags_batch(
        &self,
        subject_id: i64,
        requests: &[TagAssignmentRequest],
    ) -> Result<Vec<SubmissionOutcome>> {
        self.submissions
            .lock()
            .expect("lock")
            .push((subject_id, requests.to_vec()));
        if let Some(message) = &self.submit_error {
            bail!("{message}");
        }
        Ok(requests
            .iter()
            .zip(1000_i64..)
            .map(|(request, id)| {
                if self.duplicate_codes.contains(&request.tag_code) {
                    SubmissionOutcome::DuplicateRejected {
                        tag_code: request.tag_code.clone(),
                    }
                } else {
                    SubmissionOutcome::Accepted(TagAssignmentRecord {
                        id,
                        subject_id,
                        tag_code: request.tag_code.clone(),
                        confidence: request.confidence,
                        for_date: Some(request.for_date),
                        created_at: None,
                    })
                }
            })
            .collect())
    }

    async fn latest_for_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self.latest)
    }
}
