//! 알림 이벤트

use std::sync::Arc;
use std::time::SystemTime;

use logharbor_core::types::{LogRecord, Severity};

use super::rule::AlertRule;

/// 규칙 트리거 한 건
///
/// 리스너에게 전달된 뒤 버려지며 파이프라인은 보관하지 않습니다.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    /// 이벤트 ID (UUID v4)
    pub id: String,
    /// 트리거된 규칙
    pub rule: Arc<AlertRule>,
    /// 트리거한 레코드
    pub record: Arc<LogRecord>,
    /// 생성 시각
    pub created_at: SystemTime,
    /// 렌더링된 메시지 (`"{규칙 메시지} - {레코드 메시지}"`)
    pub message: String,
}

impl AlertEvent {
    /// 규칙과 레코드로 이벤트를 생성합니다.
    pub fn new(rule: Arc<AlertRule>, record: Arc<LogRecord>) -> Self {
        let message = format!("{} - {}", rule.message(), record.message);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule,
            record,
            created_at: SystemTime::now(),
            message,
        }
    }

    /// 규칙 심각도
    pub fn severity(&self) -> Severity {
        self.rule.severity()
    }
}
