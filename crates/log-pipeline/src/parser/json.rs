//! JSON 로그 파서
//!
//! 한 줄짜리 JSON 객체를 [`LogRecord`]로 변환합니다. 로깅 라이브러리마다 키 이름이
//! 다르므로 메시지/레벨/타임스탬프는 여러 후보 키를 순서대로 찾습니다.
//!
//! | 항목 | 후보 키 |
//! |---|---|
//! | 메시지 (필수) | `message`, `msg`, `log` |
//! | 레벨 | `level`, `loglevel`, `severity` |
//! | 타임스탬프 | `timestamp`, `time`, `@timestamp` |
//!
//! `message`와 `timestamp`를 제외한 나머지 키는 확장 필드가 됩니다.
//! 중첩 객체는 dot notation으로 평탄화합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logharbor_core::pipeline::LogParser;
//! use logharbor_pipeline::parser::JsonLogParser;
//!
//! let parser = JsonLogParser::default();
//! let record = parser.parse("api", r#"{"level":"warn","msg":"slow request","route":"/login"}"#)?;
//! assert_eq!(record.field("route"), Some("/login"));
//! ```

use std::collections::BTreeMap;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};

use logharbor_core::error::LogharborError;
use logharbor_core::pipeline::LogParser;
use logharbor_core::types::{LogLevel, LogRecord};

use crate::error::LogPipelineError;

const MESSAGE_KEYS: [&str; 3] = ["message", "msg", "log"];
const LEVEL_KEYS: [&str; 3] = ["level", "loglevel", "severity"];
const TIMESTAMP_KEYS: [&str; 3] = ["timestamp", "time", "@timestamp"];

/// 확장 필드에서 제외되는 키
const RESERVED_KEYS: [&str; 2] = ["message", "timestamp"];

/// 타임존 없는 타임스탬프 형식 (UTC로 해석)
const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// JSON 로그 파서
pub struct JsonLogParser {
    /// 최대 허용 입력 크기 (바이트)
    max_input_size: usize,
}

impl JsonLogParser {
    pub fn new() -> Self {
        Self {
            max_input_size: 1024 * 1024, // 1MB
        }
    }

    /// 최대 입력 크기를 설정합니다.
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    fn parse_error(offset: usize, reason: impl Into<String>) -> LogPipelineError {
        LogPipelineError::Parse {
            format: "json".to_owned(),
            offset,
            reason: reason.into(),
        }
    }

    /// 스칼라 값을 문자열로 변환합니다. 객체/배열/null은 `None`.
    fn scalar_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// 후보 키 중 처음으로 스칼라 값을 가진 키의 값을 반환합니다.
    fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| obj.get(*key).and_then(Self::scalar_text))
    }

    fn parse_line(&self, source: &str, line: &str) -> Result<LogRecord, LogPipelineError> {
        if line.len() > self.max_input_size {
            return Err(Self::parse_error(
                0,
                format!(
                    "input too large: {} bytes (max: {})",
                    line.len(),
                    self.max_input_size
                ),
            ));
        }

        let value: Value = serde_json::from_str(line.trim())
            .map_err(|e| Self::parse_error(e.column(), e.to_string()))?;

        let Value::Object(obj) = value else {
            return Err(Self::parse_error(0, "expected JSON object at top level"));
        };

        let message = Self::first_text(&obj, &MESSAGE_KEYS)
            .ok_or_else(|| Self::parse_error(0, "missing message field (message/msg/log)"))?;

        let level = Self::first_text(&obj, &LEVEL_KEYS)
            .and_then(|s| LogLevel::from_str_loose(&s))
            .unwrap_or(LogLevel::Info);

        let timestamp = Self::first_text(&obj, &TIMESTAMP_KEYS)
            .and_then(|s| parse_timestamp(&s))
            .unwrap_or_else(SystemTime::now);

        let mut record = LogRecord::new(source, line, level, message).with_timestamp(timestamp);
        flatten_into(&mut record.fields, &obj, "");
        Ok(record)
    }
}

impl Default for JsonLogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser for JsonLogParser {
    fn format_name(&self) -> &str {
        "json"
    }

    fn parse(&self, source: &str, line: &str) -> Result<LogRecord, LogharborError> {
        self.parse_line(source, line).map_err(LogharborError::from)
    }
}

/// 객체를 평탄화하여 확장 필드로 수집합니다.
///
/// 최상위의 예약 키와 null 값은 건너뛰고, 배열은 JSON 문자열로 직렬화합니다.
fn flatten_into(fields: &mut BTreeMap<String, String>, obj: &Map<String, Value>, prefix: &str) {
    for (key, value) in obj {
        if prefix.is_empty() && RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }

        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Value::Object(nested) => flatten_into(fields, nested, &name),
            Value::Array(items) => {
                if let Ok(s) = serde_json::to_string(items) {
                    fields.insert(name, s);
                }
            }
            Value::Null => {}
            scalar => {
                if let Some(text) = JsonLogParser::scalar_text(scalar) {
                    fields.insert(name, text);
                }
            }
        }
    }
}

/// 타임스탬프 문자열을 파싱합니다.
///
/// 지원 형식:
/// - RFC 3339: `2024-01-15T12:00:00Z`
/// - 타임존 없는 ISO 8601 / `yyyy-MM-dd HH:mm:ss` / `yyyy/MM/dd HH:mm:ss` (UTC로 해석)
/// - Unix timestamp (초 또는 밀리초)
pub(crate) fn parse_timestamp(timestamp: &str) -> Option<SystemTime> {
    let timestamp = timestamp.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(SystemTime::from(dt));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, format) {
            return Some(SystemTime::from(naive.and_utc()));
        }
    }

    if let Ok(ts_num) = timestamp.parse::<i64>() {
        // 10자리 = 초, 13자리 = 밀리초
        let dt = if ts_num > 9_999_999_999 {
            DateTime::from_timestamp_millis(ts_num)
        } else {
            DateTime::from_timestamp(ts_num, 0)
        };
        return dt.map(SystemTime::from);
    }

    None
}
