/// 分類前のテキスト正規化。
///
/// 小文字化 → 許可文字（ハングル音節・英字・数字・空白）以外を空白へ → 空白の圧縮 → 不要語除去。
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

const BUNDLED_STOPWORDS: &str = include_str!("stopwords_ko.txt");

static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^가-힣a-zA-Z0-9\s]").expect("valid character class"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    stopwords: HashSet<String>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::with_stopwords(BUNDLED_STOPWORDS.lines())
    }
}

impl TextNormalizer {
    #[must_use]
    pub fn with_stopwords<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stopwords = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_string())
            .filter(|word| !word.is_empty())
            .collect();
        Self { stopwords }
    }

    #[must_use]
    pub fn stopword_count(&self) -> usize {
        self.stopwords.len()
    }

    /// 文字種を揃え、空白を1つにまとめる（不要語は残す）。
    #[must_use]
    pub fn normalize(text: &str) -> String {
        // 分解形のハングルは音節クラスに一致しないため先に合成する
        let composed: String = text.nfc().collect::<String>().to_lowercase();
        let replaced = DISALLOWED_CHARS.replace_all(&composed, " ");
        WHITESPACE_RUN.replace_all(&replaced, " ").trim().to_string()
    }

    #[must_use]
    pub fn clean(&self, text: &str) -> String {
        Self::normalize(text)
            .split_whitespace()
            .filter(|token| !self.stopwords.contains(*token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
