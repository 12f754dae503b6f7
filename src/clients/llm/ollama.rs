/// ローカルモデル（Ollama chat API）バックエンド。
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClassificationProvider, http_client, parse_base_url};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: Url,
    model: String,
}

impl OllamaProvider {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返す。
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        timeouts: (Duration, Duration),
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeouts, "ollama")?,
            base_url: parse_base_url(base_url, "ollama")?,
            model: model.into(),
        })
    }
}

#[async_trait]
impl ClassificationProvider for OllamaProvider {
    async fn classify(&self, system: &str, content: &str) -> Result<String> {
        let url = self
            .base_url
            .join("api/chat")
            .context("failed to build ollama chat URL")?;
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            stream: false,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .context("ollama chat request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("ollama returned error status {status}: {body}");
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("failed to deserialize ollama chat response")?;
        debug!(model = %self.model, chars = chat.message.content.len(), "ollama responded");
        Ok(chat.message.content)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
