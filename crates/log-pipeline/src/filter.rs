//! 레코드 필터 -- 레벨/소스/메시지 패턴/필드 조건의 논리곱
//!
//! [`RecordFilter`]는 조회 계층이 스토어에 보관된 레코드를 걸러낼 때 사용합니다.
//! 조건을 하나도 지정하지 않은 필터는 모든 레코드와 일치합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logharbor_core::types::LogLevel;
//! use logharbor_pipeline::filter::RecordFilter;
//!
//! let filter = RecordFilter::new()
//!     .levels([LogLevel::Error, LogLevel::Fatal])
//!     .message_pattern("timeout|refused")?;
//! let hits = store.filter(&filter, 50);
//! ```

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use logharbor_core::types::{LogLevel, LogRecord};

use crate::error::LogPipelineError;

/// 레코드 필터
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// 허용 레벨 (None이면 제한 없음)
    levels: Option<HashSet<LogLevel>>,
    /// 최소 레벨
    min_level: Option<LogLevel>,
    /// 허용 소스 (None이면 제한 없음)
    sources: Option<HashSet<String>>,
    /// 메시지 패턴 (대소문자 무시, 부분 일치)
    message: Option<Regex>,
    /// 확장 필드 정확 일치 조건
    fields: Vec<(String, String)>,
}

impl RecordFilter {
    /// 모든 레코드와 일치하는 빈 필터를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 허용 레벨 집합을 지정합니다.
    pub fn levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels = Some(levels.into_iter().collect());
        self
    }

    /// 최소 레벨을 지정합니다 (`Warn`이면 Warn/Error/Fatal).
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    /// 허용 소스 집합을 지정합니다.
    pub fn sources<S: Into<String>>(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// 메시지 정규식을 지정합니다.
    pub fn message_pattern(mut self, pattern: &str) -> Result<Self, LogPipelineError> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.message = Some(regex);
        Ok(self)
    }

    /// 확장 필드 값이 정확히 일치해야 한다는 조건을 추가합니다.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// 조건이 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.levels.is_none()
            && self.min_level.is_none()
            && self.sources.is_none()
            && self.message.is_none()
            && self.fields.is_empty()
    }

    /// 레코드가 모든 조건을 만족하는지 확인합니다.
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(levels) = &self.levels
            && !levels.contains(&record.level)
        {
            return false;
        }

        if let Some(min) = self.min_level
            && record.level < min
        {
            return false;
        }

        if let Some(sources) = &self.sources
            && !sources.contains(&record.source)
        {
            return false;
        }

        if let Some(regex) = &self.message
            && !regex.is_match(&record.message)
        {
            return false;
        }

        self.fields
            .iter()
            .all(|(key, value)| record.field(key) == Some(value.as_str()))
    }
}
