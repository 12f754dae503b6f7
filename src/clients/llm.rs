/// 分類プロバイダー（LLM バックエンド）の抽象。
///
/// バックエンドは起動時に設定から一つ選ばれ、業務ロジック側では分岐しない。
pub mod gemini;
pub mod ollama;
#[cfg(test)]
pub(crate) mod scripted;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::config::{Config, LlmProviderKind};

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;

#[async_trait]
pub trait ClassificationProvider: Send + Sync {
    /// システム指示とユーザー本文を渡し、生のテキスト応答を返す。
    async fn classify(&self, system: &str, content: &str) -> Result<String>;

    /// ログ用のバックエンド名。
    fn name(&self) -> &'static str;
}

/// 設定に従ってプロバイダーを構築する。
///
/// # Errors
/// HTTPクライアントの構築やURLのパースに失敗した場合はエラーを返す。
pub fn build_provider(config: &Config) -> Result<Arc<dyn ClassificationProvider>> {
    let timeouts = (config.llm_connect_timeout(), config.llm_read_timeout());
    let provider: Arc<dyn ClassificationProvider> = match config.llm_provider() {
        LlmProviderKind::Ollama => Arc::new(OllamaProvider::new(
            config.ollama_base_url(),
            config.ollama_model(),
            timeouts,
        )?),
        LlmProviderKind::Gemini => Arc::new(GeminiProvider::new(
            config.gemini_api_url(),
            config.gemini_model(),
            config
                .gemini_api_key()
                .context("GEMINI_API_KEY is required for the gemini provider")?,
            timeouts,
        )?),
    };
    tracing::info!(provider = provider.name(), "classification provider selected");
    Ok(provider)
}

/// 短い接続タイムアウトと長い読み取りタイムアウトを持つクライアントを作る。
pub(crate) fn http_client(
    (connect_timeout, read_timeout): (Duration, Duration),
    label: &str,
) -> Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .build()
        .with_context(|| format!("failed to build {label} HTTP client"))
}

pub(crate) fn parse_base_url(raw: &str, label: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).with_context(|| format!("invalid {label} base URL"))
}
