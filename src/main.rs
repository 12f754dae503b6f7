use anyhow::Context;
use tracing::{error, info, warn};

use feed_tagger::{
    app::ComponentRegistry,
    config::{Config, RunMode},
    observability::TextfileExport,
    scheduler::{JobContext, JobKind, daemon::spawn_kst_batch_daemon},
};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        match panic_info.location() {
            Some(location) => error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                message,
                "panic occurred"
            ),
            None => error!(thread = thread_name, message, "panic occurred"),
        }
    }));

    // トレーシングは Telemetry::new() で初期化される
    let config = Config::from_env().context("failed to load configuration")?;
    let run_mode = config.run_mode();
    let (batch_hour, batch_minute) = config.batch_time();
    let metrics_path = config.metrics_textfile_path().cloned();

    let registry = ComponentRegistry::build(config).context("failed to build component registry")?;
    registry
        .prepare()
        .await
        .context("failed to prepare failure log storage")?;
    let scheduler = registry.scheduler().clone();
    let export =
        metrics_path.map(|path| TextfileExport::new(registry.telemetry().clone(), path));

    if run_mode == RunMode::Daemon {
        let daemon = spawn_kst_batch_daemon(scheduler, batch_hour, batch_minute, export)?;
        tokio::select! {
            result = daemon => {
                if let Err(err) = result {
                    error!(error = %err, "batch daemon stopped unexpectedly");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for shutdown signal");
                }
                info!("shutdown signal received");
            }
        }
        return Ok(());
    }

    let job = JobContext::new(JobKind::for_mode(run_mode));
    let result = scheduler.run_job(&job).await;

    if let Some(export) = &export {
        export.export();
    }

    let report = result.with_context(|| format!("tagging job {} failed", job.job_id))?;
    info!(
        job_id = %job.job_id,
        assigned = report.assigned_count(),
        failed = report.failed_count(),
        %report,
        "tagging job completed"
    );
    Ok(())
}
