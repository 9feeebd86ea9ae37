//! 색인용 토크나이저
//!
//! 소문자로 바꾼 뒤 ASCII 영숫자가 아닌 문자를 구분자로 보고 자릅니다.
//! 길이가 [`MIN_TERM_LEN`] 미만인 토큰은 색인하지 않습니다.

use std::collections::HashSet;

use logharbor_core::types::LogRecord;

/// 색인되는 토큰의 최소 길이
pub const MIN_TERM_LEN: usize = 3;

/// 텍스트를 색인 토큰으로 분리합니다.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() >= MIN_TERM_LEN)
        .map(str::to_ascii_lowercase)
}

/// 레코드의 색인 대상 텍스트(메시지, 소스, 레벨 이름, 확장 필드 값)에서
/// 중복 없는 토큰 목록을 만듭니다.
pub fn record_terms(record: &LogRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    let texts = [
        record.message.as_str(),
        record.source.as_str(),
        record.level.as_str(),
    ]
    .into_iter()
    .chain(record.fields.values().map(String::as_str));

    let mut terms = Vec::new();
    for text in texts {
        for token in tokenize(text) {
            if seen.insert(token.clone()) {
                terms.push(token);
            }
        }
    }
    terms
}
