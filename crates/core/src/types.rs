//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 파이프라인의 모든 구성 요소가 공유하는 데이터 구조를 정의합니다.
//! 외부 파서가 [`LogRecord`]를 만들고, 버퍼/스토어/알림 엔진이 이를 소비합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 로그 레코드
///
/// 파이프라인을 흐르는 구조화된 로그 이벤트 한 건입니다.
/// 생성 이후에는 변경되지 않으며, 파이프라인 내부에서는 `Arc<LogRecord>`로 공유됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// 고유 ID (UUID v4)
    pub id: String,
    /// 원본 소스 식별자 (파일 경로, 애플리케이션 이름 등)
    pub source: String,
    /// 파싱 전 원본 텍스트
    pub raw: String,
    /// 로그 레벨
    pub level: LogLevel,
    /// 타임스탬프
    pub timestamp: SystemTime,
    /// 렌더링된 메시지
    pub message: String,
    /// 확장 필드 (key-value)
    pub fields: BTreeMap<String, String>,
}

impl LogRecord {
    /// 새 레코드를 생성합니다. ID는 UUID v4, 타임스탬프는 현재 시각입니다.
    pub fn new(
        source: impl Into<String>,
        raw: impl Into<String>,
        level: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            raw: raw.into(),
            level,
            timestamp: SystemTime::now(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// 타임스탬프를 지정합니다.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// ID를 지정합니다.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// 확장 필드를 추가합니다.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// 확장 필드 값을 조회합니다.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.source, self.message)
    }
}

/// 로그 레벨
///
/// `Ord` 구현으로 레벨 비교가 가능합니다 (`Trace < Debug < Info < Warn < Error < Fatal`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// 추적
    Trace,
    /// 디버그
    Debug,
    /// 정보
    #[default]
    Info,
    /// 경고
    Warn,
    /// 에러
    Error,
    /// 치명적
    Fatal,
}

impl LogLevel {
    /// 모든 레벨 (오름차순)
    pub const ALL: [LogLevel; 6] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
    ];

    /// 문자열에서 레벨을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" | "information" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "err" => Some(Self::Error),
            "fatal" | "critical" | "crit" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// 대문자 레벨 이름을 반환합니다 (예: `"ERROR"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 알림 심각도
///
/// 알림 규칙의 분류 등급입니다.
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 정보성
    Info,
    /// 낮음
    Low,
    /// 중간
    #[default]
    Medium,
    /// 높음
    High,
    /// 치명적, 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 메트릭 레이블 등에 쓰는 소문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}
