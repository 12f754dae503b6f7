use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 失敗ログへ追記する1件分の内容。`message` はマスキング済みの本文。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFailureLog {
    pub subject_id: i64,
    pub message: String,
    pub for_date: NaiveDate,
    pub error_message: String,
}

/// `tag_assign_fail_log` の1行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureLogEntry {
    pub id: i64,
    pub subject_id: i64,
    pub message: String,
    pub for_date: NaiveDate,
    pub error_message: String,
    pub is_processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
