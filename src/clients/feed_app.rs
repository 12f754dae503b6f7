/// フィードサービス（外部 API）のクライアント。
///
/// タグカタログ・フィード取得、タグ一括割り当て、最新処理日の取得を行う。
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pipeline::{
    model::{
        FeedItem, FeedQuery, SubmissionOutcome, TagAssignmentRecord, TagAssignmentRequest,
        TagCatalogEntry,
    },
    orchestrator::FeedSource,
};
use crate::util::time::{
    DATE_FORMAT, date_from_epoch, end_of_day_epoch, format_date, kst, start_of_day_epoch,
};

const API_KEY_HEADER: &str = "X-API-Key";

/// 重複拒否を示す予約 id。
const DUPLICATE_SENTINEL_ID: i64 = -1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagDto {
    code: String,
    label: String,
    #[serde(default)]
    llm_desc: Option<String>,
    #[serde(default)]
    user_desc: Option<String>,
    #[serde(default)]
    priority_weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedDto {
    #[serde(default)]
    subject_id: Option<i64>,
    #[serde(default)]
    id: Option<String>,
    sent_at: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct FeedQueryParams {
    start: i64,
    end: i64,
    #[serde(rename = "isFilterNew")]
    is_filter_new: bool,
    limit: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignRequestDto {
    tag_code: String,
    for_date: String,
    confident_value: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignResponseDto {
    id: i64,
    #[serde(default)]
    tb_subject_id: Option<i64>,
    #[serde(default)]
    tag_code: Option<String>,
    #[serde(default)]
    confident_value: Option<f64>,
    #[serde(default)]
    for_date: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestForDateDto {
    #[serde(default)]
    latest_for_date: Option<String>,
}

/// フィードサービスクライアントの設定。
#[derive(Debug, Clone)]
pub struct FeedAppConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FeedAppClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl FeedAppClient {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返す。
    pub fn new(config: FeedAppConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .context("failed to build feed service HTTP client")?;

        // join() が最後のセグメントを置き換えないよう末尾スラッシュを揃える
        let normalized = if config.base_url.ends_with('/') {
            config.base_url
        } else {
            format!("{}/", config.base_url)
        };
        let base_url = Url::parse(&normalized).context("invalid feed service base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("failed to build feed service URL for {path}"))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }
}

async fn ensure_success(response: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("feed service {operation} returned error status {status}: {body}")
}

fn parse_optional_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|value| NaiveDate::parse_from_str(value.get(..10)?, DATE_FORMAT).ok())
}

/// RFC 3339、もしくはタイムゾーン無しの ISO 形式（KST とみなす）を受け付ける。
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| naive.and_local_timezone(kst()).single())
        .map(|local| local.with_timezone(&Utc))
}

fn into_outcome(
    subject_id: i64,
    request: Option<&TagAssignmentRequest>,
    dto: AssignResponseDto,
) -> SubmissionOutcome {
    let tag_code = dto
        .tag_code
        .or_else(|| request.map(|req| req.tag_code.clone()))
        .unwrap_or_default();

    if dto.id == DUPLICATE_SENTINEL_ID {
        return SubmissionOutcome::DuplicateRejected { tag_code };
    }

    SubmissionOutcome::Accepted(TagAssignmentRecord {
        id: dto.id,
        subject_id: dto.tb_subject_id.unwrap_or(subject_id),
        tag_code,
        confidence: dto
            .confident_value
            .or_else(|| request.map(|req| req.confidence))
            .unwrap_or(crate::pipeline::model::UNSCORED_CONFIDENCE),
        for_date: parse_optional_date(dto.for_date.as_deref())
            .or_else(|| request.map(|req| req.for_date)),
        created_at: dto.created_at.as_deref().and_then(parse_timestamp),
    })
}

#[async_trait]
impl FeedSource for FeedAppClient {
    async fn fetch_tags(&self) -> Result<Vec<TagCatalogEntry>> {
        let url = self.endpoint("tag")?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .context("feed service tag request failed")?;
        let response = ensure_success(response, "tag").await?;

        let tags: Vec<TagDto> = response
            .json()
            .await
            .context("failed to deserialize feed service tag response")?;

        info!(count = tags.len(), "retrieved tag catalog");
        Ok(tags
            .into_iter()
            .map(|tag| TagCatalogEntry {
                code: tag.code,
                label: tag.label,
                description: tag.llm_desc.or(tag.user_desc),
                priority_weight: tag.priority_weight.unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch_feeds(&self, query: &FeedQuery) -> Result<Vec<FeedItem>> {
        let url = self.endpoint("feed")?;
        let params = FeedQueryParams {
            start: start_of_day_epoch(query.start),
            end: end_of_day_epoch(query.end),
            is_filter_new: query.filter_new,
            limit: query.limit,
        };

        debug!(
            start = %format_date(query.start),
            end = %format_date(query.end),
            limit = query.limit,
            "fetching feeds"
        );

        let response = self
            .authorize(self.client.get(url).query(&params))
            .send()
            .await
            .context("feed service feed request failed")?;
        let response = ensure_success(response, "feed").await?;

        let feeds: Vec<FeedDto> = response
            .json()
            .await
            .context("failed to deserialize feed service feed response")?;

        let mut items = Vec::with_capacity(feeds.len());
        for feed in feeds {
            let Some(for_date) = date_from_epoch(feed.sent_at) else {
                warn!(
                    message_id = feed.id.as_deref().unwrap_or(""),
                    sent_at = feed.sent_at,
                    "dropping feed with out-of-range sentAt"
                );
                continue;
            };
            items.push(FeedItem::fresh(feed.subject_id, feed.message, for_date));
        }

        info!(count = items.len(), "retrieved feed window");
        Ok(items)
    }

    async fn assign_tags_batch(
        &self,
        subject_id: i64,
        requests: &[TagAssignmentRequest],
    ) -> Result<Vec<SubmissionOutcome>> {
        let url = self.endpoint(&format!("subject-tag/{subject_id}/tag-assign-batch"))?;
        let payload: Vec<AssignRequestDto> = requests
            .iter()
            .map(|request| AssignRequestDto {
                tag_code: request.tag_code.clone(),
                for_date: format_date(request.for_date),
                confident_value: request.confidence,
            })
            .collect();

        let response = self
            .authorize(self.client.post(url).json(&payload))
            .send()
            .await
            .with_context(|| format!("tag-assign-batch request failed for subject {subject_id}"))?;

        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            warn!(subject_id, body = %body, "tag-assign-batch rejected as duplicate");
            return Ok(requests
                .iter()
                .map(|request| SubmissionOutcome::DuplicateRejected {
                    tag_code: request.tag_code.clone(),
                })
                .collect());
        }
        let response = ensure_success(response, "tag-assign-batch").await?;

        let results: Vec<AssignResponseDto> = response
            .json()
            .await
            .context("failed to deserialize tag-assign-batch response")?;

        let outcomes: Vec<SubmissionOutcome> = results
            .into_iter()
            .enumerate()
            .map(|(index, dto)| into_outcome(subject_id, requests.get(index), dto))
            .collect();

        debug!(
            subject_id,
            accepted = outcomes.iter().filter(|o| !o.is_duplicate()).count(),
            duplicates = outcomes.iter().filter(|o| o.is_duplicate()).count(),
            "submitted tag batch"
        );
        Ok(outcomes)
    }

    async fn latest_for_date(&self) -> Result<Option<NaiveDate>> {
        let url = self.endpoint("subject-tag/latest-for-date")?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .context("feed service latest-for-date request failed")?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = ensure_success(response, "latest-for-date").await?;

        let body: LatestForDateDto = response
            .json()
            .await
            .context("failed to deserialize latest-for-date response")?;

        match body.latest_for_date.as_deref() {
            Some(raw) => parse_optional_date(Some(raw))
                .map(Some)
                .with_context(|| format!("invalid latestForDate: {raw}")),
            None => Ok(None),
        }
    }
}
