//! 텍스트 로그 파서
//!
//! 사람이 읽는 형식의 한 줄 로그를 파싱합니다.
//!
//! ```text
//! [타임스탬프] [레벨] 메시지
//! 2024-01-15 12:00:00 [ERROR] connection refused
//! 2024-01-15T12:00:00 WARN  cache miss ratio high
//! plain message without prefix
//! ```
//!
//! 타임스탬프와 레벨 토큰은 모두 선택입니다. 레벨은 대괄호 토큰이나
//! 알려진 레벨 이름인 첫 단어에서 가져오고, 메시지 키워드 검사로 보정합니다.
//! 빈 줄은 파싱 에러입니다.

use std::time::SystemTime;

use chrono::NaiveDateTime;

use logharbor_core::error::LogharborError;
use logharbor_core::pipeline::LogParser;
use logharbor_core::types::{LogLevel, LogRecord};

use crate::error::LogPipelineError;

/// `YYYY-MM-DD HH:MM:SS` 길이
const TIMESTAMP_LEN: usize = 19;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// 텍스트 로그 파서
///
/// `text`와 `plain` 힌트를 모두 처리합니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLogParser;

impl TextLogParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_line(source: &str, line: &str) -> Result<LogRecord, LogPipelineError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(LogPipelineError::Parse {
                format: "text".to_owned(),
                offset: 0,
                reason: "empty line".to_owned(),
            });
        }

        let (timestamp, rest) = split_timestamp(trimmed);
        let (token_level, rest) = split_level(rest);

        let message = if rest.is_empty() { trimmed } else { rest };
        let level = match (token_level, keyword_level(message)) {
            (Some(token), Some(keyword)) => token.max(keyword),
            (Some(level), None) | (None, Some(level)) => level,
            (None, None) => LogLevel::Info,
        };

        Ok(LogRecord::new(source, line, level, message)
            .with_timestamp(timestamp.unwrap_or_else(SystemTime::now))
            .with_field("raw_length", line.len().to_string()))
    }
}

impl LogParser for TextLogParser {
    fn format_name(&self) -> &str {
        "text"
    }

    fn supports(&self, format_hint: &str) -> bool {
        format_hint.eq_ignore_ascii_case("text") || format_hint.eq_ignore_ascii_case("plain")
    }

    fn parse(&self, source: &str, line: &str) -> Result<LogRecord, LogharborError> {
        Self::parse_line(source, line).map_err(LogharborError::from)
    }
}

/// 선행 타임스탬프를 분리합니다.
fn split_timestamp(line: &str) -> (Option<SystemTime>, &str) {
    let Some(head) = line.get(..TIMESTAMP_LEN) else {
        return (None, line);
    };

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(head, format).ok())
        .map_or((None, line), |naive| {
            (
                Some(SystemTime::from(naive.and_utc())),
                line[TIMESTAMP_LEN..].trim_start(),
            )
        })
}

/// 레벨 토큰을 분리합니다.
///
/// `[WORD]` 형태는 대괄호 안의 단어로 레벨을 추정하고, 대괄호 없는 첫 단어는
/// 알려진 레벨 이름일 때만 레벨로 취급합니다 (`ERROR:`처럼 콜론이 붙어도 허용).
fn split_level(rest: &str) -> (Option<LogLevel>, &str) {
    if let Some(inner) = rest.strip_prefix('[')
        && let Some(end) = inner.find(']')
    {
        let token = &inner[..end];
        if let Some(level) = bracket_level(token) {
            return (Some(level), inner[end + 1..].trim_start());
        }
        return (None, rest);
    }

    let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let word = rest[..word_end].trim_end_matches(':');
    match LogLevel::from_str_loose(word) {
        Some(level) if !word.is_empty() => (Some(level), rest[word_end..].trim_start()),
        _ => (None, rest),
    }
}

/// 대괄호 토큰에서 레벨을 추정합니다 (`[E_ERR]`, `[warning]` 등 부분 일치).
fn bracket_level(token: &str) -> Option<LogLevel> {
    if token.is_empty() || !token.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let upper = token.to_uppercase();
    if upper.contains("ERR") {
        Some(LogLevel::Error)
    } else if upper.contains("WARN") {
        Some(LogLevel::Warn)
    } else if upper.contains("DEBUG") {
        Some(LogLevel::Debug)
    } else if upper.contains("TRACE") {
        Some(LogLevel::Trace)
    } else if upper.contains("FATAL") || upper.contains("CRIT") {
        Some(LogLevel::Fatal)
    } else if upper.contains("INFO") {
        Some(LogLevel::Info)
    } else {
        None
    }
}

/// 메시지 키워드로 레벨을 추정합니다.
fn keyword_level(message: &str) -> Option<LogLevel> {
    let upper = message.to_uppercase();
    if ["EXCEPTION", "ERROR", "FAILED", "CRITICAL"]
        .iter()
        .any(|k| upper.contains(k))
    {
        Some(LogLevel::Error)
    } else if upper.contains("WARN") || upper.contains("CAUTION") {
        Some(LogLevel::Warn)
    } else if upper.contains("DEBUG") {
        Some(LogLevel::Debug)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parse(line: &str) -> LogRecord {
        TextLogParser.parse("app", line).unwrap()
    }

    #[test]
    fn supports_text_and_plain() {
        let parser = TextLogParser::new();
        assert!(parser.supports("text"));
        assert!(parser.supports("PLAIN"));
        assert!(!parser.supports("json"));
    }

    #[test]
    fn full_line_with_timestamp_and_bracket_level() {
        let record = parse("2024-01-15 12:00:00 [WARN] cache miss ratio high");
        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(record.message, "cache miss ratio high");
        assert_eq!(
            record.timestamp,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_705_320_000)
        );
    }

    #[test]
    fn bare_level_word() {
        let record = parse("ERROR: upstream closed");
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.message, "upstream closed");
    }

    #[test]
    fn plain_message_keeps_first_word() {
        let record = parse("Connection established to db-01");
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.message, "Connection established to db-01");
    }

    #[test]
    fn keyword_detection() {
        assert_eq!(parse("payment failed for order 7").level, LogLevel::Error);
        assert_eq!(parse("NullPointerException at Foo").level, LogLevel::Error);
        assert_eq!(parse("caution: low memory").level, LogLevel::Warn);
        assert_eq!(parse("debug dump follows").level, LogLevel::Debug);
    }

    #[test]
    fn keywords_only_raise_token_level() {
        assert_eq!(parse("[INFO] request failed").level, LogLevel::Error);
        assert_eq!(parse("[ERROR] debug context attached").level, LogLevel::Error);
    }

    #[test]
    fn unknown_bracket_stays_in_message() {
        let record = parse("[main] worker started");
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.message, "[main] worker started");
    }

    #[test]
    fn level_only_line_uses_whole_line_as_message() {
        let record = parse("[ERROR]");
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.message, "[ERROR]");
    }

    #[test]
    fn raw_length_field() {
        let record = parse("  hello  ");
        assert_eq!(record.raw, "  hello  ");
        assert_eq!(record.field("raw_length"), Some("9"));
    }

    #[test]
    fn blank_line_is_rejected() {
        assert!(TextLogParser.parse("app", "   ").is_err());
        assert!(TextLogParser.parse("app", "").is_err());
    }
}
