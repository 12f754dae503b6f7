/// 実行期間（両端を含む KST 暦日）の決定。
use std::fmt;

use chrono::NaiveDate;

use crate::util::time::format_date;

/// 最新処理日から期間を決める方針。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPolicy {
    /// 最新処理日（無ければ今日）から今日まで。手動実行向け。
    Action,
    /// 最新処理日の翌日（無ければ昨日）から昨日まで。日次バッチ向け。
    Cron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl RunWindow {
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for RunWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", format_date(self.start), format_date(self.end))
    }
}

#[must_use]
pub fn plan_window(policy: WindowPolicy, latest: Option<NaiveDate>, today: NaiveDate) -> RunWindow {
    match policy {
        WindowPolicy::Action => RunWindow::new(latest.unwrap_or(today), today),
        WindowPolicy::Cron => {
            let yesterday = previous_day(today);
            let start = latest.and_then(|date| date.succ_opt()).unwrap_or(yesterday);
            RunWindow::new(start, yesterday)
        }
    }
}

fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}
