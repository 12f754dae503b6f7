/// 1アイテム・1実行の結果表現。
use std::fmt;

use chrono::NaiveDate;

use super::model::TagAssignmentRecord;

/// アイテム1件の終端状態。
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// 少なくとも1タグが保存された。`duplicate_tags` は重複で拒否された分。
    Assigned {
        subject_id: i64,
        failure_id: Option<i64>,
        records: Vec<TagAssignmentRecord>,
        duplicate_tags: Vec<String>,
    },
    /// 適合するタグが無く、提出するものが無かった
    NoTagMatched {
        subject_id: i64,
        failure_id: Option<i64>,
    },
    /// すべて重複として拒否された。失敗ログには書かない。
    DuplicateSkipped {
        subject_id: i64,
        failure_id: Option<i64>,
        tag_codes: Vec<String>,
    },
    /// 失敗ログへ記録された
    Failed {
        subject_id: i64,
        failure_id: Option<i64>,
        log_id: i64,
        error: String,
    },
    /// subject id が無いため処理しなかった
    Skipped,
}

impl ItemOutcome {
    #[must_use]
    pub fn subject_id(&self) -> Option<i64> {
        match self {
            Self::Assigned { subject_id, .. }
            | Self::NoTagMatched { subject_id, .. }
            | Self::DuplicateSkipped { subject_id, .. }
            | Self::Failed { subject_id, .. } => Some(*subject_id),
            Self::Skipped => None,
        }
    }

    #[must_use]
    pub fn is_assigned(&self) -> bool {
        matches!(self, Self::Assigned { .. })
    }
}

/// 実行の入力元。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSource {
    Window { start: NaiveDate, end: NaiveDate },
    Replay,
}

impl fmt::Display for RunSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window { start, end } => write!(f, "window {start}..={end}"),
            Self::Replay => f.write_str("replay"),
        }
    }
}

/// 1回の実行で処理したアイテムの集計。
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub source: RunSource,
    pub outcomes: Vec<ItemOutcome>,
}

impl RunReport {
    #[must_use]
    pub fn new(source: RunSource) -> Self {
        Self {
            source,
            outcomes: Vec::new(),
        }
    }

    fn count(&self, predicate: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|outcome| predicate(outcome)).count()
    }

    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.count(ItemOutcome::is_assigned)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Failed { .. }))
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::Skipped))
    }

    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::DuplicateSkipped { .. }))
    }

    #[must_use]
    pub fn no_tag_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, ItemOutcome::NoTagMatched { .. }))
    }

    /// 保存されたタグの総数。
    #[must_use]
    pub fn tags_assigned(&self) -> usize {
        self.outcomes
            .iter()
            .map(|outcome| match outcome {
                ItemOutcome::Assigned { records, .. } => records.len(),
                _ => 0,
            })
            .sum()
    }

    /// 保存に成功した割り当てを subject ごとにまとめて返す。
    #[must_use]
    pub fn assignment_groups(&self) -> Vec<(i64, &[TagAssignmentRecord])> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ItemOutcome::Assigned {
                    subject_id,
                    records,
                    ..
                } => Some((*subject_id, records.as_slice())),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} items, {} assigned ({} tags), {} no tag, {} duplicate, {} failed, {} skipped",
            self.source,
            self.outcomes.len(),
            self.assigned_count(),
            self.tags_assigned(),
            self.no_tag_count(),
            self.duplicate_count(),
            self.failed_count(),
            self.skipped_count(),
        )
    }
}

/// 処理対象が無かったことを示す実行レベルの信号。エラーではない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NothingToDo {
    EmptyCatalog,
    EmptyWindow,
    NoPendingFailures,
    /// 開始日が終了日より後（まだ処理すべき日が来ていない）
    WindowNotOpen { start: NaiveDate, end: NaiveDate },
}

impl fmt::Display for NothingToDo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCatalog => f.write_str("tag catalog is empty"),
            Self::EmptyWindow => f.write_str("no feed items in window"),
            Self::NoPendingFailures => f.write_str("no unprocessed failure log entries"),
            Self::WindowNotOpen { start, end } => {
                write!(f, "window {start}..={end} is not open yet")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunReport),
    NothingToDo(NothingToDo),
}

impl RunOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::NothingToDo(_) => None,
        }
    }

    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.report().map_or(0, RunReport::assigned_count)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.report().map_or(0, RunReport::failed_count)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(report) => fmt::Display::fmt(report, f),
            Self::NothingToDo(reason) => write!(f, "nothing to do: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subject_id: i64, tag_code: &str) -> TagAssignmentRecord {
        TagAssignmentRecord {
            id: 1,
            subject_id,
            tag_code: tag_code.to_string(),
            confidence: -1.0,
            for_date: None,
            created_at: None,
        }
    }

    #[test]
    fn report_counts_each_terminal_state() {
        let mut report = RunReport::new(RunSource::Replay);
        report.outcomes = vec![
            ItemOutcome::Assigned {
                subject_id: 1,
                failure_id: None,
                records: vec![record(1, "club"), record(1, "event")],
                duplicate_tags: vec!["notice".to_string()],
            },
            ItemOutcome::NoTagMatched {
                subject_id: 2,
                failure_id: None,
            },
            ItemOutcome::DuplicateSkipped {
                subject_id: 3,
                failure_id: Some(9),
                tag_codes: vec!["club".to_string()],
            },
            ItemOutcome::Failed {
                subject_id: 4,
                failure_id: None,
                log_id: 10,
                error: "boom".to_string(),
            },
            ItemOutcome::Skipped,
        ];

        assert_eq!(report.assigned_count(), 1);
        assert_eq!(report.tags_assigned(), 2);
        assert_eq!(report.no_tag_count(), 1);
        assert_eq!(report.duplicate_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.assignment_groups().len(), 1);
        assert_eq!(
            report.to_string(),
            "replay: 5 items, 1 assigned (2 tags), 1 no tag, 1 duplicate, 1 failed, 1 skipped"
        );
    }

    #[test]
    fn nothing_to_do_is_distinguishable_from_failures() {
        let outcome = RunOutcome::NothingToDo(NothingToDo::EmptyWindow);

        assert!(outcome.report().is_none());
        assert_eq!(outcome.failed_count(), 0);
        assert_eq!(outcome.to_string(), "nothing to do: no feed items in window");
    }
}
