//! 로그 파싱 모듈 -- JSON, 텍스트 형식별 파서
//!
//! [`ParserRouter`]는 형식 힌트와 등록 순서에 따라 파서를 선택합니다.
//! 각 파서는 core의 [`LogParser`](logharbor_core::pipeline::LogParser) trait을 구현합니다.
//!
//! # 지원 형식
//! - 구조화 JSON ([`JsonLogParser`])
//! - 텍스트 ([`TextLogParser`], 힌트 `text`/`plain`)
//!
//! # 사용 예시
//! ```ignore
//! use logharbor_pipeline::parser::ParserRouter;
//!
//! let router = ParserRouter::with_defaults();
//! let record = router.parse("stdin", "2024-01-15 12:00:00 [ERROR] disk full", Some("text"))?;
//! ```

pub mod json;
pub mod text;

pub use json::JsonLogParser;
pub use text::TextLogParser;

use logharbor_core::error::LogharborError;
use logharbor_core::pipeline::LogParser;
use logharbor_core::types::LogRecord;

use crate::error::LogPipelineError;

/// 파서 라우터
///
/// 힌트를 지원하는 파서를 등록 순서대로 먼저 시도하고, 모두 실패하면
/// 나머지 파서를 등록 순서대로 시도합니다. 아무 파서도 성공하지 못하면
/// `UnsupportedFormat` 에러를 반환합니다.
pub struct ParserRouter {
    /// 등록된 파서 목록 (순서대로 시도)
    parsers: Vec<Box<dyn LogParser>>,
}

impl ParserRouter {
    /// 파서가 하나도 없는 라우터를 생성합니다.
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// 기본 파서 세트 (JSON, 텍스트)로 라우터를 생성합니다.
    ///
    /// 텍스트 파서는 빈 줄이 아니면 거의 모든 줄을 받아들이므로 마지막에 둡니다.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Box::new(JsonLogParser::default()))
            .register(Box::new(TextLogParser::new()))
    }

    /// 파서를 등록합니다. 등록 순서대로 시도됩니다.
    pub fn register(mut self, parser: Box<dyn LogParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    /// 원시 로그 한 줄을 파싱합니다.
    pub fn parse(
        &self,
        source: &str,
        line: &str,
        hint: Option<&str>,
    ) -> Result<LogRecord, LogharborError> {
        if self.parsers.is_empty() {
            return Err(
                LogPipelineError::UnsupportedFormat("no parsers registered".to_owned()).into(),
            );
        }

        let (mut ordered, fallback): (Vec<&dyn LogParser>, Vec<&dyn LogParser>) = self
            .parsers
            .iter()
            .map(|p| &**p)
            .partition(|p| hint.is_some_and(|h| p.supports(h)));
        ordered.extend(fallback);

        let mut last_error = None;
        for parser in ordered {
            match parser.parse(source, line) {
                Ok(record) => return Ok(record),
                Err(e) => {
                    tracing::trace!(
                        parser = parser.format_name(),
                        error = %e,
                        "parser rejected line"
                    );
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map_or_else(
            || "all parsers failed".to_owned(),
            |e| format!("all parsers failed, last error: {e}"),
        );
        Err(LogPipelineError::UnsupportedFormat(reason).into())
    }

    /// 특정 형식 이름의 파서로 직접 파싱합니다.
    pub fn parse_with(
        &self,
        format_name: &str,
        source: &str,
        line: &str,
    ) -> Result<LogRecord, LogharborError> {
        self.parsers
            .iter()
            .find(|p| p.format_name() == format_name)
            .ok_or_else(|| LogPipelineError::UnsupportedFormat(format_name.to_owned()))?
            .parse(source, line)
    }

    /// 등록된 파서 형식 이름 목록을 반환합니다.
    pub fn registered_formats(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.format_name()).collect()
    }
}

impl Default for ParserRouter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logharbor_core::error::ParseError;
    use logharbor_core::types::LogLevel;

    struct Tagging(&'static str);

    impl LogParser for Tagging {
        fn format_name(&self) -> &str {
            self.0
        }

        fn parse(&self, source: &str, line: &str) -> Result<LogRecord, LogharborError> {
            Ok(LogRecord::new(source, line, LogLevel::Info, line).with_field("parser", self.0))
        }
    }

    #[test]
    fn empty_router_returns_error() {
        let router = ParserRouter::new();
        let err = router.parse("app", "some log data", None).unwrap_err();
        assert!(matches!(
            err,
            LogharborError::Parse(ParseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn with_defaults_has_parsers() {
        let router = ParserRouter::with_defaults();
        assert_eq!(router.registered_formats(), ["json", "text"]);
    }

    #[test]
    fn json_line_without_hint() {
        let router = ParserRouter::with_defaults();
        let record = router
            .parse("app", r#"{"message":"hi","level":"error"}"#, None)
            .unwrap();
        assert_eq!(record.level, LogLevel::Error);
        assert!(record.field("raw_length").is_none());
    }

    #[test]
    fn text_line_falls_back_past_json() {
        let router = ParserRouter::with_defaults();
        let record = router.parse("app", "[WARN] low disk", Some("json")).unwrap();
        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(record.message, "low disk");
    }

    #[test]
    fn hint_selects_parser_first() {
        let router = ParserRouter::new()
            .register(Box::new(Tagging("first")))
            .register(Box::new(Tagging("second")));

        let record = router.parse("app", "x", Some("second")).unwrap();
        assert_eq!(record.field("parser"), Some("second"));

        let record = router.parse("app", "x", Some("unknown")).unwrap();
        assert_eq!(record.field("parser"), Some("first"));
    }

    #[test]
    fn no_parser_accepts_blank_line() {
        let router = ParserRouter::with_defaults();
        let err = router.parse("app", "   ", None).unwrap_err();
        assert!(matches!(
            err,
            LogharborError::Parse(ParseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn parse_with_unknown_format_returns_error() {
        let router = ParserRouter::with_defaults();
        assert!(router.parse_with("xml", "app", "<root/>").is_err());
        assert!(router.parse_with("text", "app", "hello").is_ok());
    }
}
