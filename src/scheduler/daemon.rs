use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{error, info};

use crate::observability::TextfileExport;
use crate::scheduler::{JobContext, JobKind, Scheduler, cadence::DailyCadence, window::WindowPolicy};
use crate::util::time::kst;

/// KST の `hour:minute` に毎日 `cron` ジョブを実行するデーモンを起動する。
///
/// `export` があれば毎回の実行後にメトリクスを書き出す。
///
/// # Errors
/// 時刻が範囲外の場合はエラーを返す。
pub fn spawn_kst_batch_daemon(
    scheduler: Scheduler,
    hour: u32,
    minute: u32,
    export: Option<TextfileExport>,
) -> anyhow::Result<JoinHandle<()>> {
    let cadence = DailyCadence::new(kst(), hour, minute)?;
    Ok(BatchDaemon::new(scheduler, cadence, export).spawn())
}

struct BatchDaemon {
    scheduler: Scheduler,
    cadence: DailyCadence,
    export: Option<TextfileExport>,
}

impl BatchDaemon {
    fn new(scheduler: Scheduler, cadence: DailyCadence, export: Option<TextfileExport>) -> Self {
        Self {
            scheduler,
            cadence,
            export,
        }
    }

    fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        loop {
            let now = Utc::now();
            let next = self.cadence.next_run_from(now);
            let wait = duration_until(next, now);
            info!(
                next_run_utc = %next.to_rfc3339(),
                next_run_kst = %next.with_timezone(&self.cadence.tz()).to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "scheduled daily tagging batch"
            );
            sleep(wait).await;

            self.run_once().await;

            // 同じ発火時刻での再実行を避ける
            if Utc::now() <= next {
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// 1回分の `cron` ジョブを実行し、成否にかかわらずメトリクスを書き出す。
    async fn run_once(&self) {
        let job = JobContext::new(JobKind::Planned(WindowPolicy::Cron));
        match self.scheduler.run_job(&job).await {
            Ok(report) => info!(
                job_id = %job.job_id,
                assigned = report.assigned_count(),
                failed = report.failed_count(),
                %report,
                "daily tagging batch completed"
            ),
            Err(err) => error!(job_id = %job.job_id, error = %err, "daily tagging batch failed"),
        }

        if let Some(export) = &self.export {
            export.export();
        }
    }
}

fn duration_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
