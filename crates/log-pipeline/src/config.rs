//! 로그 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`LogharborConfig`]에서
//! 버퍼/스토어/워커/알림 섹션을 모아 파이프라인 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logharbor_core::config::LogharborConfig;
//! use logharbor_pipeline::config::PipelineConfig;
//!
//! let core_config = LogharborConfig::default();
//! let config = PipelineConfig::from_core(&core_config)?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use logharbor_core::config::LogharborConfig;
use serde::{Deserialize, Serialize};

use crate::error::LogPipelineError;

/// 버퍼 포화 시 수집기 동작
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// 새 레코드를 버리고 드롭 카운터를 올림 (기본값)
    #[default]
    Drop,
    /// 공간이 생길 때까지 수집기를 대기시킴
    Block,
}

impl FromStr for BackpressurePolicy {
    type Err = LogPipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "block" => Ok(Self::Block),
            other => Err(LogPipelineError::Config {
                field: "backpressure".to_owned(),
                reason: format!("unknown policy '{other}', expected drop or block"),
            }),
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => write!(f, "drop"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// 로그 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 수집 버퍼 최대 용량
    pub buffer_capacity: usize,
    /// 배치당 최대 레코드 수
    pub batch_size: usize,
    /// 배치 채움 대기 시간 (밀리초)
    pub batch_timeout_ms: u64,
    /// 버퍼 포화 정책
    pub backpressure: BackpressurePolicy,
    /// 수집기 한 줄 최대 바이트 수
    pub max_line_length: usize,
    /// 색인 스토어 최대 용량
    pub store_capacity: usize,
    /// 처리 워커 수
    pub workers: usize,
    /// 정지 시 워커 종료 대기 시간 (초)
    pub shutdown_grace_secs: u64,
    /// 상태 리포트 주기 (초)
    pub stats_interval_secs: u64,
    /// 추가 규칙 YAML 파일 경로 (빈 문자열이면 사용하지 않음)
    pub rules_file: String,
    /// 기본 규칙 세트 등록 여부
    pub default_rules: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            batch_size: 100,
            batch_timeout_ms: 5000,
            backpressure: BackpressurePolicy::Drop,
            max_line_length: 64 * 1024,
            store_capacity: 100_000,
            workers: 4,
            shutdown_grace_secs: 5,
            stats_interval_secs: 30,
            rules_file: String::new(),
            default_rules: true,
        }
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 생성합니다.
    pub fn from_core(core: &LogharborConfig) -> Result<Self, LogPipelineError> {
        let config = Self {
            buffer_capacity: core.buffer.capacity,
            batch_size: core.buffer.batch_size,
            batch_timeout_ms: core.buffer.batch_timeout_ms,
            backpressure: core.buffer.backpressure.parse()?,
            max_line_length: core.buffer.max_line_length,
            store_capacity: core.store.capacity,
            workers: core.processor.workers,
            shutdown_grace_secs: core.processor.shutdown_grace_secs,
            stats_interval_secs: core.processor.stats_interval_secs,
            rules_file: core.alert.rules_file.clone(),
            default_rules: core.alert.default_rules,
        };
        config.validate()?;
        Ok(config)
    }

    /// 배치 채움 대기 시간
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// 워커 종료 유예 시간
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// 상태 리포트 주기
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogPipelineError> {
        const MAX_BATCH_SIZE: usize = 100_000;
        const MAX_BUFFER_CAPACITY: usize = 10_000_000;
        const MAX_STORE_CAPACITY: usize = 100_000_000;
        const MAX_WORKERS: usize = 1024;
        const MAX_BATCH_TIMEOUT_MS: u64 = 3_600_000; // 1 hour
        const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

        if self.buffer_capacity == 0 || self.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(config_error(
                "buffer_capacity",
                format!("must be 1-{MAX_BUFFER_CAPACITY}"),
            ));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(config_error(
                "batch_size",
                format!("must be 1-{MAX_BATCH_SIZE}"),
            ));
        }

        if self.batch_timeout_ms == 0 || self.batch_timeout_ms > MAX_BATCH_TIMEOUT_MS {
            return Err(config_error(
                "batch_timeout_ms",
                format!("must be 1-{MAX_BATCH_TIMEOUT_MS}"),
            ));
        }

        if self.max_line_length == 0 || self.max_line_length > MAX_LINE_LENGTH {
            return Err(config_error(
                "max_line_length",
                format!("must be 1-{MAX_LINE_LENGTH}"),
            ));
        }

        if self.store_capacity == 0 || self.store_capacity > MAX_STORE_CAPACITY {
            return Err(config_error(
                "store_capacity",
                format!("must be 1-{MAX_STORE_CAPACITY}"),
            ));
        }

        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(config_error("workers", format!("must be 1-{MAX_WORKERS}")));
        }

        if self.stats_interval_secs == 0 {
            return Err(config_error("stats_interval_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

fn config_error(field: &str, reason: impl Into<String>) -> LogPipelineError {
    LogPipelineError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 파이프라인 설정 빌더
///
/// 3개 이상의 설정 필드가 있으므로 빌더 패턴을 사용합니다.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 버퍼 용량을 설정합니다.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// 배치 크기를 설정합니다.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// 배치 채움 대기 시간을 설정합니다.
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 버퍼 포화 정책을 설정합니다.
    pub fn backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.config.backpressure = policy;
        self
    }

    /// 수집기 한 줄 최대 길이를 설정합니다.
    pub fn max_line_length(mut self, bytes: usize) -> Self {
        self.config.max_line_length = bytes;
        self
    }

    /// 스토어 용량을 설정합니다.
    pub fn store_capacity(mut self, capacity: usize) -> Self {
        self.config.store_capacity = capacity;
        self
    }

    /// 워커 수를 설정합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// 워커 종료 유예 시간(초)을 설정합니다.
    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_grace_secs = secs;
        self
    }

    /// 상태 리포트 주기(초)를 설정합니다.
    pub fn stats_interval_secs(mut self, secs: u64) -> Self {
        self.config.stats_interval_secs = secs;
        self
    }

    /// 추가 규칙 파일 경로를 설정합니다.
    pub fn rules_file(mut self, path: impl Into<String>) -> Self {
        self.config.rules_file = path.into();
        self
    }

    /// 기본 규칙 등록 여부를 설정합니다.
    pub fn default_rules(mut self, enabled: bool) -> Self {
        self.config.default_rules = enabled;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, LogPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
