// テスト用のインメモリ失敗ログ（DB接続なしで動作）

use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;

use super::{
    dao::FailureLogDao,
    models::{FailureLogEntry, NewFailureLog},
};

#[derive(Debug, Default)]
pub(crate) struct InMemoryFailureLog {
    entries: Mutex<Vec<FailureLogEntry>>,
    fail_writes: bool,
}

impl InMemoryFailureLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 既存エントリを持った状態で作る。
    pub(crate) fn with_entries(entries: Vec<NewFailureLog>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.entries.lock().expect("lock");
            for (index, entry) in entries.into_iter().enumerate() {
                guard.push(to_entry(i64::try_from(index).expect("index") + 1, entry));
            }
        }
        store
    }

    /// すべての書き込みが失敗する状態で作る。
    pub(crate) fn failing() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            fail_writes: true,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<FailureLogEntry> {
        self.entries.lock().expect("lock").clone()
    }
}

fn to_entry(id: i64, entry: NewFailureLog) -> FailureLogEntry {
    let now = Utc::now();
    FailureLogEntry {
        id,
        subject_id: entry.subject_id,
        message: entry.message,
        for_date: entry.for_date,
        error_message: entry.error_message,
        is_processed: false,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl FailureLogDao for InMemoryFailureLog {
    async fn insert(&self, entry: &NewFailureLog) -> Result<FailureLogEntry> {
        if self.fail_writes {
            bail!("database is unavailable");
        }
        let mut guard = self.entries.lock().expect("lock");
        let id = i64::try_from(guard.len()).expect("len") + 1;
        let stored = to_entry(id, entry.clone());
        guard.push(stored.clone());
        Ok(stored)
    }

    async fn list_unprocessed(&self) -> Result<Vec<FailureLogEntry>> {
        Ok(self
            .entries
            .lock()
            .expect("lock")
            .iter()
            .filter(|entry| !entry.is_processed)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: i64) -> Result<bool> {
        if self.fail_writes {
            bail!("database is unavailable");
        }
        let mut guard = self.entries.lock().expect("lock");
        Ok(guard
            .iter_mut()
            .find(|entry| entry.id == id)
            .map(|entry| {
                entry.is_processed = true;
                entry.updated_at = Utc::now();
            })
            .is_some())
    }
}
