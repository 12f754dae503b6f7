// テスト用の分類プロバイダー（応答を順番に返す）

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::ClassificationProvider;

pub(crate) struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    last_content: Mutex<Option<String>>,
}

impl ScriptedProvider {
    /// 応答を使い切った後は失敗を返す。
    pub(crate) fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<&'static str, &'static str>>,
    {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            fallback: None,
            calls: AtomicUsize::new(0),
            last_content: Mutex::new(None),
        }
    }

    /// 常に同じ応答を返す。
    pub(crate) fn always(response: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(response.to_string()),
            calls: AtomicUsize::new(0),
            last_content: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_content(&self) -> Option<String> {
        self.last_content.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ClassificationProvider for ScriptedProvider {
    async fn classify(&self, _system: &str, content: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_content.lock().expect("lock") = Some(content.to_string());
        let next = self.responses.lock().expect("lock").pop_front();
        match (next, &self.fallback) {
            (Some(Ok(text)), _) => Ok(text),
            (Some(Err(message)), _) => Err(anyhow!(message)),
            (None, Some(text)) => Ok(text.clone()),
            (None, None) => Err(anyhow!("scripted provider exhausted")),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
