/// 失敗ログ（`tag_assign_fail_log`）のデータアクセス層。
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Executor, PgPool, Row, postgres::PgRow};

use super::models::{FailureLogEntry, NewFailureLog};

/// 新規テーブルは BIGINT 列で作る。既存テーブル（SERIAL / INTEGER 列）とも
/// 互換になるよう、読み書きでは常に bigint へキャストする。
const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tag_assign_fail_log (
    id            BIGSERIAL   PRIMARY KEY,
    subject_id    BIGINT      NOT NULL,
    message       TEXT        NOT NULL,
    for_date      DATE        NOT NULL,
    error_message TEXT        NOT NULL,
    is_processed  BOOLEAN     NOT NULL DEFAULT FALSE,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_tag_assign_fail_log_unprocessed
    ON tag_assign_fail_log (id)
    WHERE is_processed = FALSE;
";

const SELECT_COLUMNS: &str = "id::bigint AS id, subject_id::bigint AS subject_id, message, \
     for_date, error_message, is_processed, \
     created_at::timestamptz AS created_at, updated_at::timestamptz AS updated_at";

#[async_trait]
pub trait FailureLogDao: Send + Sync {
    /// 失敗エントリを追記する。既存エントリは変更しない。
    async fn insert(&self, entry: &NewFailureLog) -> Result<FailureLogEntry>;

    /// 未処理のエントリを id 昇順で返す。
    async fn list_unprocessed(&self) -> Result<Vec<FailureLogEntry>>;

    /// エントリを処理済みにする。存在しない id なら `false`。
    async fn mark_processed(&self, id: i64) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct PgFailureLogDao {
    pool: PgPool,
}

impl PgFailureLogDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// テーブルとインデックスが無ければ作成する。
    ///
    /// # Errors
    /// DDL の実行に失敗した場合はエラーを返す。
    pub async fn ensure_schema(&self) -> Result<()> {
        self.pool
            .execute(SCHEMA_SQL)
            .await
            .context("failed to ensure tag_assign_fail_log schema")?;
        Ok(())
    }
}

fn entry_from_row(row: &PgRow) -> Result<FailureLogEntry> {
    Ok(FailureLogEntry {
        id: row.try_get("id")?,
        subject_id: row.try_get("subject_id")?,
        message: row.try_get("message")?,
        for_date: row.try_get("for_date")?,
        error_message: row.try_get("error_message")?,
        is_processed: row.try_get("is_processed")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl FailureLogDao for PgFailureLogDao {
    async fn insert(&self, entry: &NewFailureLog) -> Result<FailureLogEntry> {
        let sql = format!(
            "INSERT INTO tag_assign_fail_log (subject_id, message, for_date, error_message) \
             VALUES ($1::bigint, $2, $3, $4) \
             RETURNING {SELECT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(entry.subject_id)
            .bind(&entry.message)
            .bind(entry.for_date)
            .bind(&entry.error_message)
            .fetch_one(&self.pool)
            .await
            .with_context(|| {
                format!("failed to insert failure log for subject {}", entry.subject_id)
            })?;
        entry_from_row(&row)
    }

    async fn list_unprocessed(&self) -> Result<Vec<FailureLogEntry>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM tag_assign_fail_log \
             WHERE is_processed = FALSE ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("failed to list unprocessed failure logs")?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn mark_processed(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tag_assign_fail_log \
             SET is_processed = TRUE, updated_at = now() \
             WHERE id = $1::bigint",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to mark failure log {id} processed"))?;
        Ok(result.rows_affected() > 0)
    }
}
