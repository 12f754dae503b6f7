/// 分類プロバイダーと応答抽出を組み合わせ、有限回の再試行でタグを決める。
use std::{collections::HashSet, sync::Arc};

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::clients::llm::ClassificationProvider;
use crate::error::TaggingError;
use crate::observability::metrics::Metrics;
use crate::util::retry::RetryConfig;

use super::extract::extract_tag_codes;
use super::model::{MAX_TAGS_PER_ITEM, TagAssignment, TagCatalogEntry};

const SYSTEM_PROMPT_HEAD: &str = "persona: 너는 콘텐츠 라벨링 전문가야.
instruction:
  - 아래 단일 메시지를 참고하여, 해당 메시지에 적합한 태그 코드 배열 (string[])만을 출력해줘.
  - 태그의 \"llm_desc\"가 각 태그의 선별 기준이야.
  - 적합성이 95% 이상일 경우에만 출력에 포함시키며, 태그는 최대 3개까지만 선택해.
  - 출력은 반드시 오직 순수한 JSON 배열만 출력해야 해. 다른 텍스트나 번호 매김 없이 오직 JSON 형식이어야 해.
태그 목록:
";

const SYSTEM_PROMPT_TAIL: &str = "
출력 형식 예시:
[\"<tag_code1>\", \"<tag_code2>\", ...]
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationPrompt {
    pub system: String,
    pub content: String,
}

#[derive(Serialize)]
struct MessageContent<'a> {
    message: &'a str,
}

/// システム指示（カタログ埋め込み）とユーザー本文を組み立てる。
///
/// # Errors
/// カタログの JSON 化に失敗した場合はエラーを返す。
pub fn build_prompt(
    message: &str,
    catalog: &[TagCatalogEntry],
) -> Result<ClassificationPrompt, serde_json::Error> {
    let catalog_json = serde_json::to_string_pretty(catalog)?;
    let content = serde_json::to_string_pretty(&MessageContent { message })?;
    Ok(ClassificationPrompt {
        system: format!("{SYSTEM_PROMPT_HEAD}{catalog_json}{SYSTEM_PROMPT_TAIL}"),
        content,
    })
}

/// 直近の試行がどう終わったか。
enum LastAttempt {
    /// 構造的には正しいが、有効なタグが1つも無かった
    Empty,
    Failed(String),
}

pub struct TagAssigner {
    provider: Arc<dyn ClassificationProvider>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl TagAssigner {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ClassificationProvider>,
        retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            provider,
            retry,
            metrics,
        }
    }

    /// 1件のメッセージにタグを割り当てる。
    ///
    /// 取得失敗・解析失敗・空の結果はいずれも再試行する。最終試行が空の結果なら
    /// タグ無しの割り当てを返し、解析失敗なら [`TaggingError::ClassificationParse`] を返す。
    ///
    /// # Errors
    /// すべての試行が失敗した場合はエラーを返す。
    pub async fn assign(
        &self,
        subject_id: i64,
        cleaned_message: &str,
        catalog: &[TagCatalogEntry],
    ) -> Result<TagAssignment, TaggingError> {
        let prompt = build_prompt(cleaned_message, catalog).map_err(|error| {
            TaggingError::ClassificationParse {
                subject_id,
                attempts: 0,
                last_error: format!("failed to build prompt: {error}"),
            }
        })?;
        let known_codes: HashSet<&str> = catalog.iter().map(|tag| tag.code.as_str()).collect();

        let mut last = LastAttempt::Failed("no attempts were made".to_string());
        let mut attempt = 1;
        while self.retry.can_attempt(attempt) {
            let delay = self.retry.delay_before_attempt(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }
            if attempt > 1 {
                self.metrics.classification_retries.inc();
            }
            self.metrics.classification_attempts.inc();

            let timer = self.metrics.classification_duration.start_timer();
            let response = self
                .provider
                .classify(&prompt.system, &prompt.content)
                .await;
            timer.observe_duration();

            let parsed = response
                .map_err(|error| format!("{error:#}"))
                .and_then(|text| {
                    debug!(subject_id, attempt, response = %text, "classification response");
                    extract_tag_codes(&text).map_err(|error| error.to_string())
                });

            match parsed {
                Ok(codes) => {
                    let accepted = filter_codes(subject_id, codes, &known_codes);
                    if !accepted.is_empty() {
                        debug!(
                            subject_id,
                            attempt,
                            provider = self.provider.name(),
                            tag_count = accepted.len(),
                            "tags classified"
                        );
                        return Ok(TagAssignment {
                            subject_id,
                            tag_codes: accepted,
                        });
                    }
                    warn!(subject_id, attempt, "classification returned no usable tag");
                    last = LastAttempt::Empty;
                }
                Err(error) => {
                    warn!(
                        subject_id,
                        attempt,
                        provider = self.provider.name(),
                        error = %error,
                        "classification attempt failed"
                    );
                    last = LastAttempt::Failed(error);
                }
            }
            attempt += 1;
        }

        let attempts = attempt - 1;
        match last {
            LastAttempt::Empty => Ok(TagAssignment {
                subject_id,
                tag_codes: Vec::new(),
            }),
            LastAttempt::Failed(last_error) => Err(TaggingError::ClassificationParse {
                subject_id,
                attempts,
                last_error,
            }),
        }
    }
}

/// カタログに無いコードを捨て、順序を保って重複を除き、上限で切る。
fn filter_codes(subject_id: i64, codes: Vec<String>, known: &HashSet<&str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::new();
    let mut unknown = Vec::new();
    for code in codes {
        if code.is_empty() {
            continue;
        }
        if !known.contains(code.as_str()) {
            unknown.push(code);
            continue;
        }
        if seen.insert(code.clone()) {
            accepted.push(code);
        }
    }
    if !unknown.is_empty() {
        warn!(subject_id, ?unknown, "dropping tag codes missing from the catalog");
    }
    accepted.truncate(MAX_TAGS_PER_ITEM);
    accepted
}
