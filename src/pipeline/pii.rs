/// 外部送信前の個人情報マスキング。
///
/// 人名 → リンク → メール → 電話番号の順に、独立した置換器を順番に適用する。
/// 置換後のプレースホルダーはどのパターンにも一致しないため、二度適用しても結果は変わらない。
use std::{ops::Range, path::Path, sync::Arc};

use aho_corasick::{AhoCorasick, MatchKind};
use anyhow::{Context, Result};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use tracing::{error, info};

pub const NAME_PLACEHOLDER: &str = "[이름]";
pub const LINK_PLACEHOLDER: &str = "[링크]";
pub const EMAIL_PLACEHOLDER: &str = "[이메일]";
pub const PHONE_PLACEHOLDER: &str = "[전화번호]";

static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("valid link pattern"));
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email pattern")
});
static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(01[0-9])[-.\s]?(\d{3,4})[-.\s]?(\d{4})\b").expect("valid phone pattern")
});
static PLACEHOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?:이름|링크|이메일|전화번호)\]").expect("valid placeholder pattern")
});

/// `(text) -> text` の置換器。
pub trait TextRedactor: Send + Sync {
    fn name(&self) -> &'static str;
    fn redact(&self, text: &str) -> String;
}

/// 正規表現に一致した部分をプレースホルダーへ置き換える。
pub struct PatternRedactor {
    name: &'static str,
    pattern: &'static Lazy<Regex>,
    placeholder: &'static str,
}

impl PatternRedactor {
    #[must_use]
    pub fn link() -> Self {
        Self {
            name: "link",
            pattern: &LINK_PATTERN,
            placeholder: LINK_PLACEHOLDER,
        }
    }

    #[must_use]
    pub fn email() -> Self {
        Self {
            name: "email",
            pattern: &EMAIL_PATTERN,
            placeholder: EMAIL_PLACEHOLDER,
        }
    }

    /// 韓国の携帯電話番号（区切り文字は任意）。
    #[must_use]
    pub fn phone() -> Self {
        Self {
            name: "phone",
            pattern: &PHONE_PATTERN,
            placeholder: PHONE_PLACEHOLDER,
        }
    }
}

impl TextRedactor for PatternRedactor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn redact(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, regex::NoExpand(self.placeholder))
            .into_owned()
    }
}

/// 人名のスパンを検出する能力。実装は差し替え可能。
pub trait NameRecognizer: Send + Sync {
    /// `text` 内の人名のバイト範囲を重複なしで昇順に返す。
    fn person_spans(&self, text: &str) -> Vec<Range<usize>>;
}

type RecognizerFactory = Box<dyn Fn() -> Result<Arc<dyn NameRecognizer>> + Send + Sync>;

/// 初回利用時（または [`LazyNameRecognizer::initialize`] 呼び出し時）に
/// 一度だけ内部の認識器を構築する。
pub struct LazyNameRecognizer {
    cell: OnceCell<Arc<dyn NameRecognizer>>,
    factory: RecognizerFactory,
}

impl LazyNameRecognizer {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn NameRecognizer>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// 認識器を構築する。既に構築済みなら何もしない。
    ///
    /// # Errors
    /// ファクトリが失敗した場合はエラーを返す。
    pub fn initialize(&self) -> Result<()> {
        self.cell.get_or_try_init(|| (self.factory)()).map(|_| ())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl NameRecognizer for LazyNameRecognizer {
    fn person_spans(&self, text: &str) -> Vec<Range<usize>> {
        match self.cell.get_or_try_init(|| (self.factory)()) {
            Ok(recognizer) => recognizer.person_spans(text),
            Err(err) => {
                error!(error = %format!("{err:#}"), "name recognizer is unavailable");
                Vec::new()
            }
        }
    }
}

/// 人名辞書による認識器（最左最長一致）。
#[derive(Debug, Clone, Default)]
pub struct DictionaryNameRecognizer {
    matcher: Option<AhoCorasick>,
}

impl DictionaryNameRecognizer {
    /// # Errors
    /// オートマトンの構築に失敗した場合はエラーを返す。
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty() && !name.starts_with('#'))
            .filter(|name| !name.contains(['[', ']']))
            .collect();
        patterns.sort();
        patterns.dedup();

        if patterns.is_empty() {
            return Ok(Self::default());
        }

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .context("failed to build name dictionary automaton")?;
        Ok(Self {
            matcher: Some(matcher),
        })
    }

    /// 1行1名の辞書ファイルを読み込む。`#` で始まる行は無視する。
    ///
    /// # Errors
    /// ファイルの読み込みに失敗した場合はエラーを返す。
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read name dictionary {}", path.display()))?;
        let recognizer = Self::from_names(contents.lines())?;
        info!(
            path = %path.display(),
            names = recognizer.pattern_count(),
            "name dictionary loaded"
        );
        Ok(recognizer)
    }

    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.matcher.as_ref().map_or(0, AhoCorasick::patterns_len)
    }
}

impl NameRecognizer for DictionaryNameRecognizer {
    fn person_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.matcher.as_ref().map_or_else(Vec::new, |matcher| {
            matcher
                .find_iter(text)
                .map(|found| found.start()..found.end())
                .collect()
        })
    }
}

/// 人名スパンを置き換える。既存のプレースホルダーの内側は対象にしない。
pub struct NameRedactor {
    recognizer: Arc<dyn NameRecognizer>,
}

impl NameRedactor {
    #[must_use]
    pub fn new(recognizer: Arc<dyn NameRecognizer>) -> Self {
        Self { recognizer }
    }

    fn redact_segment(&self, segment: &str, out: &mut String) {
        let mut cursor = 0;
        for span in self.recognizer.person_spans(segment) {
            if span.start < cursor
                || span.is_empty()
                || !segment.is_char_boundary(span.start)
                || !segment.is_char_boundary(span.end)
            {
                continue;
            }
            out.push_str(&segment[cursor..span.start]);
            out.push_str(NAME_PLACEHOLDER);
            cursor = span.end;
        }
        out.push_str(&segment[cursor..]);
    }
}

impl TextRedactor for NameRedactor {
    fn name(&self) -> &'static str {
        "name"
    }

    fn redact(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for placeholder in PLACEHOLDER_PATTERN.find_iter(text) {
            self.redact_segment(&text[cursor..placeholder.start()], &mut out);
            out.push_str(placeholder.as_str());
            cursor = placeholder.end();
        }
        self.redact_segment(&text[cursor..], &mut out);
        out
    }
}

/// 置換器を順番に適用するマスキングパイプライン。
pub struct PiiMasker {
    redactors: Vec<Box<dyn TextRedactor>>,
}

impl PiiMasker {
    #[must_use]
    pub fn new(redactors: Vec<Box<dyn TextRedactor>>) -> Self {
        Self { redactors }
    }

    /// 人名 → リンク → メール → 電話番号の標準構成。
    #[must_use]
    pub fn standard(recognizer: Arc<dyn NameRecognizer>) -> Self {
        Self::new(vec![
            Box::new(NameRedactor::new(recognizer)),
            Box::new(PatternRedactor::link()),
            Box::new(PatternRedactor::email()),
            Box::new(PatternRedactor::phone()),
        ])
    }

    #[must_use]
    pub fn mask(&self, text: &str) -> String {
        self.redactors
            .iter()
            .fold(text.to_string(), |acc, redactor| redactor.redact(&acc))
    }

    #[must_use]
    pub fn redactor_names(&self) -> Vec<&'static str> {
        self.redactors.iter().map(|redactor| redactor.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn masker_with(names: &[&str]) -> PiiMasker {
        let recognizer = DictionaryNameRecognizer::from_names(names).expect("dictionary builds");
        PiiMasker::standard(Arc::new(recognizer))
    }

    #[rstest]
    #[case("자세한 건 https://club.example.com/apply?id=3 참고", "자세한 건 [링크] 참고")]
    #[case("문의: hong.gildong+club@example.ac.kr", "문의: [이메일]")]
    #[case("연락처 010-1234-5678 입니다", "연락처 [전화번호] 입니다")]
    #[case("연락처 01112345678", "연락처 [전화번호]")]
    #[case("연락처 010 123 4567", "연락처 [전화번호]")]
    #[case("연락처 010.1234.5678.", "연락처 [전화번호].")]
    #[case("학번 20231234567", "학번 20231234567")]
    #[case("김철수 선배가 모집합니다", "[이름] 선배가 모집합니다")]
    #[case("plain text stays", "plain text stays")]
    fn masks_each_kind(#[case] input: &str, #[case] expected: &str) {
        let masker = masker_with(&["김철수", "이영희"]);

        assert_eq!(masker.mask(input), expected);
    }

    #[test]
    fn applies_redactors_in_fixed_order() {
        let masker = masker_with(&[]);

        assert_eq!(masker.redactor_names(), vec!["name", "link", "email", "phone"]);
    }

    #[rstest]
    #[case("김철수(010-1234-5678, chulsoo@example.com) https://x.io/김철수")]
    #[case("이름 링크 [이름] [링크] 이메일")]
    #[case("010-010-1234-5678 0101234567801012345678")]
    #[case("mail a@b.co then http://a@b.co/path")]
    #[case("")]
    fn masking_is_idempotent(#[case] input: &str) {
        let masker = masker_with(&["김철수", "이름", "링크"]);

        let once = masker.mask(input);
        assert_eq!(masker.mask(&once), once);
    }

    #[test]
    fn existing_placeholders_are_not_renamed() {
        let masker = masker_with(&["이름", "이메일"]);

        assert_eq!(masker.mask("[이름] 님의 이메일"), "[이름] 님의 [이름]");
    }

    #[test]
    fn leftmost_longest_name_wins() {
        let recognizer = DictionaryNameRecognizer::from_names(["김철", "김철수", "# comment", " "])
            .expect("dictionary");

        assert_eq!(recognizer.pattern_count(), 2);
        assert_eq!(recognizer.person_spans("김철수가"), vec![0.."김철수".len()]);
    }

    #[test]
    fn dictionary_loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("names.txt");
        std::fs::write(&path, "# names\n박지민\n\n최유진\n").expect("write dictionary");

        let recognizer = DictionaryNameRecognizer::from_file(&path).expect("load");

        assert_eq!(recognizer.pattern_count(), 2);
        assert!(DictionaryNameRecognizer::from_file(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn lazy_recognizer_builds_once_on_first_use() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let lazy = LazyNameRecognizer::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let recognizer: Arc<dyn NameRecognizer> =
                Arc::new(DictionaryNameRecognizer::from_names(["박지민"])?);
            Ok(recognizer)
        });

        assert!(!lazy.is_initialized());
        let masker = PiiMasker::standard(Arc::new(lazy));
        assert_eq!(masker.mask("박지민 안녕"), "[이름] 안녕");
        assert_eq!(masker.mask("박지민 또"), "[이름] 또");
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_recognizer_failure_is_reported_by_initialize() {
        let lazy = LazyNameRecognizer::new(|| anyhow::bail!("model missing"));

        assert!(lazy.initialize().is_err());
        assert!(lazy.person_spans("아무개").is_empty());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        // プレースホルダーの中身と同じ語も辞書に含める
        const NAMES: &[&str] = &["김철수", "이름", "링크", "이메일", "전화번호", "com", "http", "01"];

        fn fragment() -> impl Strategy<Value = String> {
            prop_oneof![
                "[김철수이름링크메일전화번호가-힣a-zA-Z0-9\\[\\]@.:/ -]{1,6}",
                proptest::sample::select(vec![
                    "https://", "http://", "010", "-1234-", "5678", "@", ".co", "[이름]", "[링크]",
                    "[이메일]", "[전화번호]", " ",
                ])
                .prop_map(str::to_string),
            ]
        }

        proptest! {
            #[test]
            fn masking_is_idempotent_for_any_text(
                parts in proptest::collection::vec(fragment(), 0..8)
            ) {
                let masker = masker_with(NAMES);
                let input = parts.concat();

                let once = masker.mask(&input);
                prop_assert_eq!(masker.mask(&once), once);
            }
        }
    }
}
