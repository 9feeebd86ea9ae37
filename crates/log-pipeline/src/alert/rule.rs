//! 알림 규칙 -- 대상 필드, 대소문자 무시 패턴, 심각도, 트리거 통계
//!
//! [`AlertRule`]은 `Arc`로 공유되며, 트리거 통계만 내부에서 갱신됩니다.
//! YAML 규칙 파일은 [`RuleDefinition`]으로 역직렬화된 뒤 [`AlertRule`]로 컴파일됩니다.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use logharbor_core::types::{LogRecord, Severity};

use crate::error::LogPipelineError;

/// 최대 정규식 길이 (ReDoS 완화)
const MAX_PATTERN_LENGTH: usize = 1000;

/// 컴파일된 정규식 크기 상한 (바이트)
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// 규칙이 검사할 레코드 필드
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum RuleField {
    /// 렌더링된 메시지
    #[default]
    Message,
    /// 소스 식별자
    Source,
    /// 레벨 이름 (`"ERROR"` 등)
    Level,
    /// 이름이 지정된 확장 필드
    Field(String),
}

impl RuleField {
    /// 필드 선택자 문자열을 해석합니다.
    ///
    /// `message`/`source`/`level` 이외의 이름은 확장 필드로 취급합니다.
    pub fn parse(selector: &str) -> Self {
        match selector {
            "message" => Self::Message,
            "source" => Self::Source,
            "level" => Self::Level,
            other => Self::Field(other.to_owned()),
        }
    }

    /// 선택자 이름
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Source => "source",
            Self::Level => "level",
            Self::Field(name) => name,
        }
    }

    /// 레코드에서 대상 텍스트를 꺼냅니다. 확장 필드가 없으면 `None`.
    pub fn resolve<'a>(&self, record: &'a LogRecord) -> Option<&'a str> {
        match self {
            Self::Message => Some(&record.message),
            Self::Source => Some(&record.source),
            Self::Level => Some(record.level.as_str()),
            Self::Field(name) => record.field(name),
        }
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 알림 규칙
#[derive(Debug)]
pub struct AlertRule {
    /// 규칙 고유 ID
    id: String,
    /// 표시 이름
    name: String,
    /// 검사 대상 필드
    field: RuleField,
    /// 대소문자 무시 패턴 (부분 일치)
    pattern: Regex,
    /// 심각도
    severity: Severity,
    /// 알림 메시지 템플릿
    message: String,
    /// 트리거 횟수
    trigger_count: AtomicU64,
    /// 마지막 트리거 시각
    last_triggered: Mutex<Option<SystemTime>>,
}

impl AlertRule {
    /// 새 규칙을 생성합니다.
    ///
    /// 대상 필드는 `message`, 심각도는 `Medium`, 메시지는 규칙 이름이 기본값입니다.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, LogPipelineError> {
        let id = id.into();
        let name = name.into();

        if id.is_empty() {
            return Err(LogPipelineError::RuleValidation {
                rule_id: "(empty)".to_owned(),
                reason: "rule id must not be empty".to_owned(),
            });
        }

        if pattern.len() > MAX_PATTERN_LENGTH {
            return Err(LogPipelineError::RuleValidation {
                rule_id: id,
                reason: format!(
                    "pattern too long: {} characters (max: {MAX_PATTERN_LENGTH})",
                    pattern.len()
                ),
            });
        }

        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| LogPipelineError::RuleValidation {
                rule_id: id.clone(),
                reason: format!("invalid pattern: {e}"),
            })?;

        Ok(Self {
            message: name.clone(),
            id,
            name,
            field: RuleField::Message,
            pattern,
            severity: Severity::Medium,
            trigger_count: AtomicU64::new(0),
            last_triggered: Mutex::new(None),
        })
    }

    /// 대상 필드를 지정합니다.
    pub fn with_field(mut self, field: RuleField) -> Self {
        self.field = field;
        self
    }

    /// 심각도를 지정합니다.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// 알림 메시지 템플릿을 지정합니다.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// 레코드의 대상 필드에 패턴이 나타나는지 확인합니다.
    ///
    /// 대상 확장 필드가 없으면 일치하지 않은 것으로 봅니다.
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.field
            .resolve(record)
            .is_some_and(|text| self.pattern.is_match(text))
    }

    /// 트리거 통계를 갱신합니다.
    pub(crate) fn record_trigger(&self) {
        self.trigger_count.fetch_add(1, Ordering::Relaxed);
        let mut last = self
            .last_triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = Some(SystemTime::now());
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &RuleField {
        &self.field
    }

    /// 원본 패턴 문자열
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 생성 이후 트리거된 횟수
    pub fn trigger_count(&self) -> u64 {
        self.trigger_count.load(Ordering::Relaxed)
    }

    /// 마지막 트리거 시각 (트리거된 적 없으면 `None`)
    pub fn last_triggered(&self) -> Option<SystemTime> {
        *self
            .last_triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AlertRule{{name='{}', pattern='{}', severity={}, triggers={}}}",
            self.name,
            self.pattern.as_str(),
            self.severity,
            self.trigger_count()
        )
    }
}

/// 규칙 파일의 규칙 정의
///
/// # YAML 스키마
/// ```yaml
/// - id: disk-full            # 생략 시 UUID
///   name: Disk Full
///   pattern: "no space left|disk full"
///   field: message           # message | source | level | <확장 필드 이름>
///   severity: high           # 생략 시 medium
///   message: Disk exhausted  # 생략 시 name
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// 규칙 ID
    #[serde(default)]
    pub id: Option<String>,
    /// 표시 이름
    pub name: String,
    /// 정규식 패턴
    pub pattern: String,
    /// 대상 필드 선택자
    #[serde(default = "default_field")]
    pub field: String,
    /// 심각도 문자열 (대소문자 무시)
    #[serde(default)]
    pub severity: Option<String>,
    /// 알림 메시지 템플릿
    #[serde(default)]
    pub message: Option<String>,
}

fn default_field() -> String {
    "message".to_owned()
}

impl RuleDefinition {
    /// 정의를 검증하고 규칙으로 컴파일합니다.
    pub fn compile(self) -> Result<AlertRule, LogPipelineError> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if self.name.trim().is_empty() {
            return Err(LogPipelineError::RuleValidation {
                rule_id: id,
                reason: "rule name must not be empty".to_owned(),
            });
        }

        let severity = match self.severity.as_deref() {
            None => Severity::Medium,
            Some(s) => Severity::from_str_loose(s).ok_or_else(|| {
                LogPipelineError::RuleValidation {
                    rule_id: id.clone(),
                    reason: format!("unknown severity '{s}'"),
                }
            })?,
        };

        let message = self.message.unwrap_or_else(|| self.name.clone());

        Ok(AlertRule::new(id, self.name, &self.pattern)?
            .with_field(RuleField::parse(self.field.trim()))
            .with_severity(severity)
            .with_message(message))
    }
}
