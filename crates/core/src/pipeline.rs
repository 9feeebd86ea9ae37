//! 파이프라인 trait -- 모듈 확장 포인트 정의
//!
//! - [`Pipeline`]: 시작/정지/헬스 체크 생명주기
//! - [`LogParser`]: 원시 로그 한 줄을 [`LogRecord`]로 변환하는 파서

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LogharborError;
use crate::types::LogRecord;

/// 모듈 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하
    Degraded(String),
    /// 비정상
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 파이프라인 생명주기 trait
///
/// 데몬은 이 trait을 통해 모듈을 시작하고 정지합니다.
pub trait Pipeline: Send + Sync {
    /// 파이프라인을 시작합니다. 이미 실행 중이면 에러를 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), LogharborError>> + Send;

    /// 파이프라인을 정지합니다. 진행 중인 배치는 완료될 때까지 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), LogharborError>> + Send;

    /// 현재 헬스 상태를 반환합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 로그 파서 trait
///
/// 새로운 로그 형식을 지원하려면 이 trait을 구현합니다.
pub trait LogParser: Send + Sync {
    /// 지원하는 로그 형식 이름
    fn format_name(&self) -> &str;

    /// 형식 힌트를 이 파서가 우선 처리하는지 여부
    ///
    /// 기본 구현은 형식 이름과 대소문자 무시 비교합니다.
    fn supports(&self, format_hint: &str) -> bool {
        self.format_name().eq_ignore_ascii_case(format_hint)
    }

    /// 원시 로그 한 줄을 레코드로 파싱
    fn parse(&self, source: &str, line: &str) -> Result<LogRecord, LogharborError>;
}
