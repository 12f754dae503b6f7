use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

use crate::{
    clients::{FeedAppClient, FeedAppConfig, build_provider},
    config::Config,
    observability::Telemetry,
    pipeline::{
        FeedSource, PiiMasker, TagAssigner, TaggingOrchestrator, TextNormalizer,
        orchestrator::FetchSettings,
        pii::{DictionaryNameRecognizer, LazyNameRecognizer, NameRecognizer},
    },
    scheduler::Scheduler,
    store::{FailureLogDao, PgFailureLogDao},
};

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    scheduler: Scheduler,
    failure_log: Arc<PgFailureLogDao>,
    name_recognizer: Arc<LazyNameRecognizer>,
}

impl ComponentRegistry {
    /// 構成情報から依存をまとめて組み立てる。DB と外部サービスにはまだ接続しない。
    ///
    /// # Errors
    /// Telemetry の初期化、HTTP クライアントまたはコネクションプールの構築に失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;
        let metrics = telemetry.metrics();

        let feed: Arc<dyn FeedSource> = Arc::new(FeedAppClient::new(FeedAppConfig {
            base_url: config.feed_api_base_url().to_string(),
            api_key: config.feed_api_key().map(str::to_string),
            connect_timeout: config.feed_api_connect_timeout(),
            read_timeout: config.feed_api_read_timeout(),
        })?);
        let provider = build_provider(&config)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections())
            .acquire_timeout(config.db_acquire_timeout())
            .test_before_acquire(true)
            .connect_lazy(config.db_dsn())
            .context("failed to configure failure log connection pool")?;
        let failure_log = Arc::new(PgFailureLogDao::new(pool));

        let name_recognizer = Arc::new(name_recognizer(&config));
        let masker = Arc::new(PiiMasker::standard(
            Arc::clone(&name_recognizer) as Arc<dyn NameRecognizer>
        ));

        let orchestrator = TaggingOrchestrator::new(
            feed,
            Arc::clone(&failure_log) as Arc<dyn FailureLogDao>,
            masker,
            TextNormalizer::default(),
            TagAssigner::new(provider, config.tag_assign_retry(), Arc::clone(&metrics)),
            metrics,
            FetchSettings {
                limit: config.feed_fetch_limit(),
                filter_new: config.feed_filter_new(),
            },
        );
        let scheduler = Scheduler::new(Arc::new(orchestrator));

        Ok(Self {
            config,
            telemetry,
            scheduler,
            failure_log,
            name_recognizer,
        })
    }

    /// 実行前の準備。失敗ログのスキーマを用意し、人名認識器を読み込む。
    ///
    /// # Errors
    /// スキーマ作成に失敗した場合はエラーを返す。
    pub async fn prepare(&self) -> Result<()> {
        self.failure_log.ensure_schema().await?;
        if let Err(err) = self.name_recognizer.initialize() {
            warn!(error = %format!("{err:#}"), "name recognizer failed to initialize, names will not be masked");
        }
        Ok(())
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

/// 辞書ファイルが設定されていればそれを、無ければ空の辞書を遅延読み込みする。
fn name_recognizer(config: &Config) -> LazyNameRecognizer {
    let path = config.pii_name_dictionary_path().cloned();
    LazyNameRecognizer::new(move || {
        let recognizer = match &path {
            Some(path) => DictionaryNameRecognizer::from_file(path)?,
            None => {
                warn!("PII_NAME_DICTIONARY_PATH is not set, names will not be masked");
                DictionaryNameRecognizer::default()
            }
        };
        Ok(Arc::new(recognizer) as Arc<dyn NameRecognizer>)
    })
}
