//! 알림 엔진 -- 패턴 규칙 평가 및 리스너 전달
//!
//! [`AlertEngine`]은 레코드마다 등록된 규칙을 등록 순서대로 평가하고,
//! 일치한 규칙마다 [`AlertEvent`]를 만들어 모든 리스너에게 동기적으로 전달합니다.
//!
//! # 아키텍처
//! - [`rule`]: 규칙 정의와 매칭
//! - [`event`]: 트리거 한 건
//! - [`listener`]: 구독 인터페이스와 기본 리스너
//! - [`loader`]: YAML 규칙 파일 로딩
//!
//! # 동시성
//! 규칙 목록과 리스너 목록은 copy-on-write 스냅샷입니다. 변경은 벡터를 복제한 뒤
//! `Arc`를 교체하고, `evaluate`는 호출 시작 시점에 스냅샷을 한 번 잡아 순회합니다.
//! 평가 도중 추가/제거된 규칙은 그 평가에 반영될 수도, 안 될 수도 있습니다.

pub mod event;
pub mod listener;
pub mod loader;
pub mod rule;

pub use event::AlertEvent;
pub use listener::{AlertListener, ListenerError, LoggingListener, QueuedListener};
pub use loader::RuleLoader;
pub use rule::{AlertRule, RuleDefinition, RuleField};

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use logharbor_core::metrics as m;
use logharbor_core::types::{LogRecord, Severity};

use crate::error::LogPipelineError;

use self::listener::deliver;

type Snapshot<T> = RwLock<Arc<Vec<Arc<T>>>>;

/// 기본 에러 탐지 규칙 ID
pub const ERROR_RULE_ID: &str = "error-detector";

/// 기본 전체 일치 규칙 ID
pub const CATCH_ALL_RULE_ID: &str = "high-frequency";

/// 알림 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    /// 등록된 규칙 수
    pub rule_count: usize,
    /// 현재 규칙들의 트리거 합계
    pub total_triggers: u64,
    /// 심각도별 트리거 합계
    pub triggers_by_severity: BTreeMap<Severity, u64>,
    /// 리스너 전달 실패 누계
    pub listener_failures: u64,
}

/// 알림 엔진
pub struct AlertEngine {
    rules: Snapshot<AlertRule>,
    listeners: Snapshot<dyn AlertListener>,
    listener_failures: AtomicU64,
}

impl AlertEngine {
    /// 규칙도 리스너도 없는 엔진을 생성합니다.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            listeners: RwLock::new(Arc::new(Vec::new())),
            listener_failures: AtomicU64::new(0),
        }
    }

    /// 기본 규칙 세트가 등록된 엔진을 생성합니다.
    pub fn with_default_rules() -> Result<Self, LogPipelineError> {
        let engine = Self::new();
        for rule in Self::default_rules()? {
            engine.add_rule(rule)?;
        }
        Ok(engine)
    }

    /// 기본 규칙 세트
    ///
    /// - `error-detector`: 에러성 어휘 (High)
    /// - `high-frequency`: 모든 레코드 (Medium), 유입량 가시화용
    pub fn default_rules() -> Result<Vec<AlertRule>, LogPipelineError> {
        Ok(vec![
            AlertRule::new(
                ERROR_RULE_ID,
                "Error Log Detector",
                "error|exception|failed|critical|fatal",
            )?
            .with_severity(Severity::High)
            .with_message("Error pattern detected in logs"),
            AlertRule::new(CATCH_ALL_RULE_ID, "High Frequency Logs", ".*")?
                .with_severity(Severity::Medium)
                .with_message("High log frequency detected"),
        ])
    }

    /// 규칙을 등록합니다. 같은 ID가 이미 있으면 거부합니다.
    pub fn add_rule(&self, rule: impl Into<Arc<AlertRule>>) -> Result<(), LogPipelineError> {
        self.add_rules([rule.into()]).map(|_| ())
    }

    /// 여러 규칙을 한 번에 등록하고 등록한 개수를 반환합니다.
    ///
    /// 기존 규칙과 겹치거나 서로 겹치는 ID가 하나라도 있으면 아무것도 등록하지 않습니다.
    pub fn add_rules<I>(&self, rules: I) -> Result<usize, LogPipelineError>
    where
        I: IntoIterator,
        I::Item: Into<Arc<AlertRule>>,
    {
        let incoming: Vec<Arc<AlertRule>> = rules.into_iter().map(Into::into).collect();
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);

        {
            let mut ids: HashSet<&str> = guard.iter().map(|r| r.id()).collect();
            if let Some(dup) = incoming.iter().find(|rule| !ids.insert(rule.id())) {
                return Err(LogPipelineError::RuleValidation {
                    rule_id: dup.id().to_owned(),
                    reason: "duplicate rule id".to_owned(),
                });
            }
        }

        let added = incoming.len();
        let mut next = Vec::with_capacity(guard.len() + added);
        next.extend(guard.iter().cloned());
        for rule in incoming {
            tracing::debug!(rule_id = rule.id(), rule = rule.name(), "alert rule added");
            next.push(rule);
        }
        metrics::gauge!(m::ALERT_RULES_LOADED).set(next.len() as f64);
        *guard = Arc::new(next);
        Ok(added)
    }

    /// 규칙을 제거하고 제거된 규칙을 반환합니다.
    pub fn remove_rule(&self, rule_id: &str) -> Option<Arc<AlertRule>> {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let position = guard.iter().position(|r| r.id() == rule_id)?;

        let mut next: Vec<_> = guard.iter().cloned().collect();
        let removed = next.remove(position);
        metrics::gauge!(m::ALERT_RULES_LOADED).set(next.len() as f64);
        *guard = Arc::new(next);

        tracing::debug!(rule_id, "alert rule removed");
        Some(removed)
    }

    /// 현재 규칙 스냅샷 (등록 순서)
    pub fn rules(&self) -> Arc<Vec<Arc<AlertRule>>> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// ID로 규칙을 조회합니다.
    pub fn rule(&self, rule_id: &str) -> Option<Arc<AlertRule>> {
        self.rules().iter().find(|r| r.id() == rule_id).cloned()
    }

    pub fn rule_count(&self) -> usize {
        self.rules().len()
    }

    /// 리스너를 등록합니다.
    pub fn add_listener(&self, listener: Arc<dyn AlertListener>) {
        let mut guard = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<_> = guard.iter().cloned().collect();
        tracing::debug!(listener = listener.name(), "alert listener added");
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// 같은 인스턴스(`Arc::ptr_eq`)로 등록된 리스너를 제거합니다.
    ///
    /// 제거했으면 `true`를 반환합니다.
    pub fn remove_listener(&self, listener: &Arc<dyn AlertListener>) -> bool {
        let mut guard = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        let next: Vec<_> = guard
            .iter()
            .filter(|l| !Arc::ptr_eq(*l, listener))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listener_snapshot().len()
    }

    fn listener_snapshot(&self) -> Arc<Vec<Arc<dyn AlertListener>>> {
        Arc::clone(&self.listeners.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// 레코드를 모든 규칙에 대해 평가하고 트리거된 규칙 수를 반환합니다.
    ///
    /// 리스너 실패(에러 반환과 패닉 모두)는 로그와 카운터로만 남고
    /// 다른 리스너나 이후 규칙 평가를 막지 않습니다.
    pub fn evaluate(&self, record: &Arc<LogRecord>) -> usize {
        let rules = self.rules();
        let listeners = self.listener_snapshot();
        let mut triggered = 0;

        for rule in rules.iter().filter(|rule| rule.matches(record)) {
            rule.record_trigger();
            triggered += 1;
            metrics::counter!(m::ALERT_TRIGGERED_TOTAL, m::LABEL_SEVERITY => rule.severity().as_str())
                .increment(1);

            if listeners.is_empty() {
                continue;
            }

            let event = AlertEvent::new(Arc::clone(rule), Arc::clone(record));
            for listener in listeners.iter() {
                if let Err(e) = deliver(&**listener, &event) {
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::ALERT_LISTENER_FAILURES_TOTAL).increment(1);
                    tracing::error!(
                        listener = listener.name(),
                        rule_id = rule.id(),
                        record_id = %record.id,
                        error = %e,
                        "alert listener failed"
                    );
                }
            }
        }

        triggered
    }

    /// 현재 규칙 기준 통계를 계산합니다.
    pub fn stats(&self) -> AlertStats {
        let rules = self.rules();
        let mut stats = AlertStats {
            rule_count: rules.len(),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
            ..AlertStats::default()
        };

        for rule in rules.iter() {
            let count = rule.trigger_count();
            stats.total_triggers += count;
            *stats.triggers_by_severity.entry(rule.severity()).or_default() += count;
        }
        stats
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}
