use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::RunMode,
    error::TaggingError,
    pipeline::{RunOutcome, TaggingOrchestrator},
    util::time::today_kst,
};

use super::window::{RunWindow, WindowPolicy, plan_window};

/// 1回のジョブで処理する範囲。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// 最新処理日から期間を決めて新規フィードを処理し、続けて失敗ログを再処理する
    Planned(WindowPolicy),
    /// 指定期間を処理し、続けて失敗ログを再処理する
    Fixed(RunWindow),
    /// 失敗ログの再処理のみ
    ReplayOnly,
}

impl JobKind {
    /// 実行モードに対応する1回分のジョブ。`daemon` は日次の `cron` ジョブを繰り返す。
    #[must_use]
    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::Action => Self::Planned(WindowPolicy::Action),
            RunMode::Cron | RunMode::Daemon => Self::Planned(WindowPolicy::Cron),
            RunMode::Window { start, end } => Self::Fixed(RunWindow::new(start, end)),
            RunMode::Replay => Self::ReplayOnly,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub kind: JobKind,
}

impl JobContext {
    #[must_use]
    pub fn new(kind: JobKind) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            kind,
        }
    }
}

/// 期間処理の結果。
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRun {
    pub window: RunWindow,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job_id: Uuid,
    pub window: Option<WindowRun>,
    pub replay: RunOutcome,
}

impl JobReport {
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.window
            .as_ref()
            .map_or(0, |run| run.outcome.assigned_count())
            + self.replay.assigned_count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.window
            .as_ref()
            .map_or(0, |run| run.outcome.failed_count())
            + self.replay.failed_count()
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(run) = &self.window {
            write!(f, "window {}: {}; ", run.window, run.outcome)?;
        }
        write!(f, "replay: {}", self.replay)
    }
}

/// ジョブ（期間処理 + 再処理）の実行者。
#[derive(Clone)]
pub struct Scheduler {
    orchestrator: Arc<TaggingOrchestrator>,
}

impl Scheduler {
    #[must_use]
    pub fn new(orchestrator: Arc<TaggingOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// 現在時刻を基準にジョブを実行する。
    ///
    /// # Errors
    /// 期間処理または再処理が実行レベルのエラーで中断した場合はエラーを返す。
    pub async fn run_job(&self, context: &JobContext) -> Result<JobReport, TaggingError> {
        self.run_job_at(context, Utc::now()).await
    }

    /// `now` の KST 暦日を「今日」としてジョブを実行する。
    ///
    /// # Errors
    /// 期間処理または再処理が実行レベルのエラーで中断した場合はエラーを返す。
    pub async fn run_job_at(
        &self,
        context: &JobContext,
        now: DateTime<Utc>,
    ) -> Result<JobReport, TaggingError> {
        info!(job_id = %context.job_id, kind = ?context.kind, "running tagging job");

        let window = match context.kind {
            JobKind::Planned(policy) => {
                let latest = self.orchestrator.latest_for_date().await?;
                let window = plan_window(policy, latest, today_kst(now));
                info!(job_id = %context.job_id, latest = ?latest, %window, "planned window");
                Some(window)
            }
            JobKind::Fixed(window) => Some(window),
            JobKind::ReplayOnly => None,
        };

        let window = match window {
            Some(window) => {
                let outcome = self
                    .orchestrator
                    .run_window(window.start, window.end)
                    .await?;
                info!(job_id = %context.job_id, %window, %outcome, "window finished");
                Some(WindowRun { window, outcome })
            }
            None => None,
        };

        let replay = self.orchestrator.run_replay().await?;
        info!(job_id = %context.job_id, %replay, "replay finished");

        let report = JobReport {
            job_id: context.job_id,
            window,
            replay,
        };
        if report.failed_count() > 0 {
            warn!(
                job_id = %context.job_id,
                failed = report.failed_count(),
                "some items failed and were logged for retry"
            );
        }
        Ok(report)
    }
}
