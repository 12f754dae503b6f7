/// ホスト型 API（Gemini generateContent）バックエンド。
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClassificationProvider, http_client, parse_base_url};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: [Content<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: Url,
    model: String,
    api_key: String,
}

impl GeminiProvider {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返す。
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeouts: (Duration, Duration),
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeouts, "gemini")?,
            base_url: parse_base_url(base_url, "gemini")?,
            model: model.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ClassificationProvider for GeminiProvider {
    async fn classify(&self, system: &str, content: &str) -> Result<String> {
        let url = self
            .base_url
            .join(&format!("v1beta/models/{}:generateContent", self.model))
            .context("failed to build gemini generateContent URL")?;
        let request = GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: [Part { text: system }],
            },
            contents: [Content {
                role: "user",
                parts: [Part { text: content }],
            }],
        };

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .context("gemini generateContent request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("gemini returned error status {status}: {body}");
        }

        let generated: GenerateContentResponse = response
            .json()
            .await
            .context("failed to deserialize gemini response")?;

        let text: String = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .context("gemini response contained no candidates")?;

        debug!(model = %self.model, chars = text.len(), "gemini responded");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
