//! 설정 관리 -- logharbor.toml 파싱 및 런타임 설정
//!
//! [`LogharborConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGHARBOR_BUFFER_CAPACITY=5000` 형식)
//! 3. 설정 파일 (`logharbor.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logharbor_core::error::LogharborError> {
//! use logharbor_core::config::LogharborConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogharborConfig::load("logharbor.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogharborConfig::parse("[buffer]\ncapacity = 5000")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogharborError};

/// logharbor 통합 설정
///
/// `logharbor.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogharborConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집 버퍼 설정
    #[serde(default)]
    pub buffer: BufferConfig,
    /// 색인 스토어 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 처리 워커 풀 설정
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// 알림 엔진 설정
    #[serde(default)]
    pub alert: AlertConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogharborConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogharborError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogharborError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogharborError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogharborError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogharborError> {
        toml::from_str(toml_str).map_err(|e| {
            LogharborError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGHARBOR_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGHARBOR_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGHARBOR_GENERAL_LOG_FORMAT");

        // Buffer
        override_usize(&mut self.buffer.capacity, "LOGHARBOR_BUFFER_CAPACITY");
        override_usize(&mut self.buffer.batch_size, "LOGHARBOR_BUFFER_BATCH_SIZE");
        override_u64(
            &mut self.buffer.batch_timeout_ms,
            "LOGHARBOR_BUFFER_BATCH_TIMEOUT_MS",
        );
        override_string(&mut self.buffer.backpressure, "LOGHARBOR_BUFFER_BACKPRESSURE");
        override_usize(
            &mut self.buffer.max_line_length,
            "LOGHARBOR_BUFFER_MAX_LINE_LENGTH",
        );

        // Store
        override_usize(&mut self.store.capacity, "LOGHARBOR_STORE_CAPACITY");

        // Processor
        override_usize(&mut self.processor.workers, "LOGHARBOR_PROCESSOR_WORKERS");
        override_u64(
            &mut self.processor.shutdown_grace_secs,
            "LOGHARBOR_PROCESSOR_SHUTDOWN_GRACE_SECS",
        );
        override_u64(
            &mut self.processor.stats_interval_secs,
            "LOGHARBOR_PROCESSOR_STATS_INTERVAL_SECS",
        );

        // Alert
        override_string(&mut self.alert.rules_file, "LOGHARBOR_ALERT_RULES_FILE");
        override_bool(&mut self.alert.default_rules, "LOGHARBOR_ALERT_DEFAULT_RULES");

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGHARBOR_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGHARBOR_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGHARBOR_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogharborError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.buffer.capacity == 0 {
            return Err(invalid("buffer.capacity", "must be greater than 0"));
        }

        if self.buffer.batch_size == 0 {
            return Err(invalid("buffer.batch_size", "must be greater than 0"));
        }

        if self.buffer.batch_timeout_ms == 0 {
            return Err(invalid("buffer.batch_timeout_ms", "must be greater than 0"));
        }

        if self.buffer.max_line_length == 0 {
            return Err(invalid("buffer.max_line_length", "must be greater than 0"));
        }

        let valid_policies = ["drop", "block"];
        if !valid_policies.contains(&self.buffer.backpressure.as_str()) {
            return Err(invalid(
                "buffer.backpressure",
                format!("must be one of: {}", valid_policies.join(", ")),
            ));
        }

        if self.store.capacity == 0 {
            return Err(invalid("store.capacity", "must be greater than 0"));
        }

        if self.processor.workers == 0 {
            return Err(invalid("processor.workers", "must be greater than 0"));
        }

        if self.processor.stats_interval_secs == 0 {
            return Err(invalid(
                "processor.stats_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero when metrics are enabled"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LogharborError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수집 버퍼 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// 버퍼에 대기할 수 있는 최대 레코드 수
    pub capacity: usize,
    /// 배치당 최대 레코드 수
    pub batch_size: usize,
    /// 첫 레코드 도착 후 배치를 채우기 위해 기다리는 최대 시간 (밀리초)
    pub batch_timeout_ms: u64,
    /// 버퍼 포화 시 수집기 동작 (drop, block)
    pub backpressure: String,
    /// 수집기가 받아들이는 한 줄의 최대 바이트 수 (개행 제외)
    pub max_line_length: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            batch_size: 100,
            batch_timeout_ms: 5000,
            backpressure: "drop".to_owned(),
            max_line_length: 64 * 1024, // 64KB
        }
    }
}

/// 색인 스토어 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 보관할 최대 레코드 수
    pub capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { capacity: 100_000 }
    }
}

/// 처리 워커 풀 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// 동시 워커 수
    pub workers: usize,
    /// 정지 시 워커 종료를 기다리는 시간 (초)
    pub shutdown_grace_secs: u64,
    /// 상태 리포트 주기 (초)
    pub stats_interval_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            shutdown_grace_secs: 5,
            stats_interval_secs: 30,
        }
    }
}

/// 알림 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// 추가 규칙 YAML 파일 경로 (빈 문자열이면 사용하지 않음)
    pub rules_file: String,
    /// 기본 규칙 세트 등록 여부
    pub default_rules: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            rules_file: String::new(),
            default_rules: true,
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = LogharborConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.buffer.capacity, 1000);
        assert_eq!(config.buffer.batch_size, 100);
        assert_eq!(config.buffer.batch_timeout_ms, 5000);
        assert_eq!(config.buffer.backpressure, "drop");
        assert_eq!(config.buffer.max_line_length, 65_536);
        assert!(config.processor.workers >= 1);
        assert!(config.alert.default_rules);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        LogharborConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = LogharborConfig::parse("").unwrap();
        assert_eq!(config.store.capacity, 100_000);
        assert_eq!(config.processor.shutdown_grace_secs, 5);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[buffer]
capacity = 50
backpressure = "block"

[store]
capacity = 3
"#;
        let config = LogharborConfig::parse(toml).unwrap();
        assert_eq!(config.buffer.capacity, 50);
        assert_eq!(config.buffer.backpressure, "block");
        // batch_size는 기본값 유지
        assert_eq!(config.buffer.batch_size, 100);
        assert_eq!(config.store.capacity, 3);
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = LogharborConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            LogharborError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = LogharborConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_zero_capacities() {
        let mut config = LogharborConfig::default();
        config.buffer.capacity = 0;
        assert!(config.validate().unwrap_err().to_string().contains("buffer.capacity"));

        let mut config = LogharborConfig::default();
        config.store.capacity = 0;
        assert!(config.validate().unwrap_err().to_string().contains("store.capacity"));
    }

    #[test]
    fn validate_rejects_zero_max_line_length() {
        let mut config = LogharborConfig::parse("[buffer]\nmax_line_length = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buffer.max_line_length"));

        config.buffer.max_line_length = 1024;
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_backpressure_policy() {
        let mut config = LogharborConfig::default();
        config.buffer.backpressure = "retry".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backpressure"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = LogharborConfig::default();
        config.processor.workers = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn from_file_missing_returns_not_found() {
        let err = LogharborConfig::from_file("/nonexistent/logharbor.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LogharborError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
