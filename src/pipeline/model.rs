/// パイプライン全体で共有するドメイン型。
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::store::FailureLogEntry;

/// 未採点を表す信頼度の既定値。
pub const UNSCORED_CONFIDENCE: f64 = -1.0;

/// 1件あたりに割り当てるタグの上限。
pub const MAX_TAGS_PER_ITEM: usize = 3;

/// タグ付け対象のフィードアイテム。取得後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// 外部サービスの subject id。無いアイテムはスキップされる。
    pub subject_id: Option<i64>,
    pub message: String,
    /// 送信時刻の KST 暦日
    pub for_date: NaiveDate,
    /// 失敗ログから再処理されるときのみ設定される
    pub failure_id: Option<i64>,
}

impl FeedItem {
    #[must_use]
    pub fn fresh(subject_id: Option<i64>, message: impl Into<String>, for_date: NaiveDate) -> Self {
        Self {
            subject_id,
            message: message.into(),
            for_date,
            failure_id: None,
        }
    }

    /// 失敗ログのエントリを通常のアイテムと同じ形に変換する。
    #[must_use]
    pub fn from_failure(entry: &FailureLogEntry) -> Self {
        Self {
            subject_id: Some(entry.subject_id),
            message: entry.message.clone(),
            for_date: entry.for_date,
            failure_id: Some(entry.id),
        }
    }
}

/// タグカタログの1件。実行ごとに一度だけ取得するスナップショット。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCatalogEntry {
    pub code: String,
    pub label: String,
    /// 分類の選別基準となる説明
    #[serde(rename = "llm_desc", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub priority_weight: f64,
}

/// フィード取得の期間指定（両端を含む KST 暦日）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub filter_new: bool,
    pub limit: u32,
}

/// 分類結果。`tag_codes` が空なら提出するものが無い。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagAssignment {
    pub subject_id: i64,
    pub tag_codes: Vec<String>,
}

/// 1タグ分の割り当てリクエスト。
#[derive(Debug, Clone, PartialEq)]
pub struct TagAssignmentRequest {
    pub tag_code: String,
    pub for_date: NaiveDate,
    pub confidence: f64,
}

impl TagAssignmentRequest {
    #[must_use]
    pub fn unscored(tag_code: impl Into<String>, for_date: NaiveDate) -> Self {
        Self {
            tag_code: tag_code.into(),
            for_date,
            confidence: UNSCORED_CONFIDENCE,
        }
    }
}

/// フィードサービスに保存された割り当て。
#[derive(Debug, Clone, PartialEq)]
pub struct TagAssignmentRecord {
    pub id: i64,
    pub subject_id: i64,
    pub tag_code: String,
    pub confidence: f64,
    pub for_date: Option<NaiveDate>,
    pub created_at: Option<DateTime<Utc>>,
}

/// 提出したタグごとの結果。
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Accepted(TagAssignmentRecord),
    /// 既に同じ割り当てが存在したため保存されなかった
    DuplicateRejected { tag_code: String },
}

impl SubmissionOutcome {
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateRejected { .. })
    }
}
