pub mod metrics;
pub(crate) mod tracing;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};

use self::metrics::Metrics;

/// Telemetry（メトリクスとトレーシング）を管理する構造体。
#[derive(Debug, Clone)]
pub struct Telemetry {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Telemetry {
    /// トレーシングを初期化し、専用レジストリにメトリクスを登録する。
    ///
    /// # Errors
    /// サブスクライバの初期化またはメトリクス登録に失敗した場合はエラーを返す。
    pub fn new() -> Result<Self> {
        tracing::init()?;
        Self::without_tracing()
    }

    /// トレーシングに触れずにメトリクスだけを用意する（テスト用途）。
    ///
    /// # Errors
    /// メトリクス登録に失敗した場合はエラーを返す。
    pub fn without_tracing() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(Metrics::new(&registry)?);
        Ok(Self { registry, metrics })
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Prometheus テキスト形式でレンダリングする。
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// node_exporter の textfile collector 向けにメトリクスを書き出す。
    ///
    /// 途中状態を読まれないよう、一時ファイルに書いてからリネームする。
    ///
    /// # Errors
    /// ファイルの書き込みまたはリネームに失敗した場合はエラーを返す。
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("prom.tmp");
        fs::write(&tmp_path, self.render_prometheus())
            .with_context(|| format!("failed to write metrics to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to move metrics into {}", path.display()))?;
        ::tracing::debug!(path = %path.display(), "metrics textfile written");
        Ok(())
    }
}

/// 実行ごとにメトリクスを書き出す先（`METRICS_TEXTFILE_PATH`）。
#[derive(Debug, Clone)]
pub struct TextfileExport {
    telemetry: Telemetry,
    path: PathBuf,
}

impl TextfileExport {
    #[must_use]
    pub fn new(telemetry: Telemetry, path: PathBuf) -> Self {
        Self { telemetry, path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 書き出しの失敗は警告ログに留め、実行は止めない。
    pub fn export(&self) {
        if let Err(err) = self.telemetry.write_textfile(&self.path) {
            ::tracing::warn!(
                error = %format!("{err:#}"),
                path = %self.path.display(),
                "failed to write metrics textfile"
            );
        }
    }
}
