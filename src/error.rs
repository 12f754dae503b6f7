/// タグ付けパイプラインのドメインエラー。
use thiserror::Error;

/// 重複拒否を示すエラーメッセージ中のマーカー。
///
/// フィードサービスが重複割り当てを例外テキストで返す場合に備え、
/// 英語・韓国語の両方を照合する。
pub const DUPLICATE_MARKERS: [&str; 2] = ["duplicate", "중복"];

#[derive(Debug, Error)]
pub enum TaggingError {
    /// `subject_id` を持たないアイテム。スキップ対象であり失敗ログには書かない。
    #[error("feed item has no subject id")]
    MissingIdentifier,

    #[error(
        "tag assignment failed for subject {subject_id} after {attempts} attempts: {last_error}"
    )]
    ClassificationParse {
        subject_id: i64,
        attempts: usize,
        last_error: String,
    },

    #[error("duplicate tag assignment rejected for subject {subject_id}: {tag_codes:?}")]
    DuplicateConflict {
        subject_id: i64,
        tag_codes: Vec<String>,
    },

    #[error("{operation} failed: {source:#}")]
    Transport {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failure log {operation} failed: {source:#}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl TaggingError {
    pub(crate) fn transport(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Transport { operation, source }
    }

    pub(crate) fn persistence(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Persistence { operation, source }
    }
}

/// エラーが重複による拒否を表すかどうかを判定する。
///
/// 型付きの [`TaggingError::DuplicateConflict`] を優先し、
/// それ以外はエラーチェーン全体の文字列にマーカーが含まれるかで判定する。
#[must_use]
pub fn is_duplicate_conflict(error: &anyhow::Error) -> bool {
    if error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<TaggingError>(), Some(TaggingError::DuplicateConflict { .. })))
    {
        return true;
    }

    let rendered = format!("{error:#}").to_lowercase();
    DUPLICATE_MARKERS
        .iter()
        .any(|marker| rendered.contains(marker))
}
