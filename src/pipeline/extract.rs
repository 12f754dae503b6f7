/// 分類プロバイダーの生応答からタグコード配列を取り出す。
///
/// 説明文で配列が囲まれていても、最初の `[` から最後の `]` までを JSON として読む。
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no JSON array found in response")]
    MissingArray,
    #[error("invalid JSON array: {0}")]
    InvalidJson(String),
    #[error("element {index} is not a string")]
    NonStringElement { index: usize },
}

/// # Errors
/// 括弧が見つからない、JSON として不正、または要素が文字列でない場合は [`ExtractError`] を返す。
pub fn extract_tag_codes(raw: &str) -> Result<Vec<String>, ExtractError> {
    let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) else {
        return Err(ExtractError::MissingArray);
    };
    if end < start {
        return Err(ExtractError::MissingArray);
    }

    let elements: Vec<Value> = serde_json::from_str(&raw[start..=end])
        .map_err(|error| ExtractError::InvalidJson(error.to_string()))?;

    // オブジェクト配列なら各要素の "code" だけを使う
    if matches!(elements.first(), Some(Value::Object(_))) {
        let mut codes = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let Value::Object(fields) = element else {
                return Err(ExtractError::NonStringElement { index });
            };
            match fields.get("code") {
                Some(Value::String(code)) => codes.push(code.trim().to_string()),
                Some(_) => return Err(ExtractError::NonStringElement { index }),
                None => {}
            }
        }
        return Ok(codes);
    }

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| match element {
            Value::String(code) => Ok(code.trim().to_string()),
            _ => Err(ExtractError::NonStringElement { index }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|code| (*code).to_string()).collect()
    }

    #[rstest]
    #[case(r#"here you go: ["a", "b"] thanks"#, &["a", "b"])]
    #[case(r#"[{"code":"club"},{"code":"event"}]"#, &["club", "event"])]
    #[case(r#"[{"code":"club","label":"동아리"},{"label":"no code"}]"#, &["club"])]
    #[case("```json\n[\"notice\"]\n```", &["notice"])]
    #[case("[]", &[])]
    #[case(r#"[" club "]"#, &["club"])]
    fn extracts_codes(#[case] raw: &str, #[case] expected: &[&str]) {
        assert_eq!(extract_tag_codes(raw), Ok(codes(expected)));
    }

    #[rstest]
    #[case("no array here", ExtractError::MissingArray)]
    #[case("] backwards [", ExtractError::MissingArray)]
    #[case("[1, 2]", ExtractError::NonStringElement { index: 0 })]
    #[case(r#"["a", 3]"#, ExtractError::NonStringElement { index: 1 })]
    #[case(r#"[{"code": 5}]"#, ExtractError::NonStringElement { index: 0 })]
    #[case(r#"[{"code": "a"}, "b"]"#, ExtractError::NonStringElement { index: 1 })]
    fn rejects_invalid_structures(#[case] raw: &str, #[case] expected: ExtractError) {
        assert_eq!(extract_tag_codes(raw), Err(expected));
    }

    #[rstest]
    #[case::two_arrays(r#"first ["a"] and then ["b"]"#)]
    #[case::bracketed_prose("[see the list below] club, event")]
    #[case::object_wrapping_arrays(r#"{"codes": ["a"], "extra": ["b"]}"#)]
    fn bracketed_non_array_text_is_invalid_json(#[case] raw: &str) {
        let result = extract_tag_codes(raw);

        assert!(matches!(result, Err(ExtractError::InvalidJson(_))));
    }
}
