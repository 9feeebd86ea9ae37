//! 로그 파이프라인 에러 타입
//!
//! [`LogPipelineError`]는 로그 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<LogPipelineError> for LogharborError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logharbor_core::error::{
    ConfigError, LogharborError, ParseError, PipelineError, StorageError,
};

/// 로그 파이프라인 도메인 에러
///
/// 파싱, 룰 로딩, 수집, 저장, 설정 등 파이프라인 내부의
/// 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum LogPipelineError {
    /// 로그 파싱 실패
    #[error("parse error: {format} at offset {offset}: {reason}")]
    Parse {
        /// 파서 형식 (json, text 등)
        format: String,
        /// 실패 위치 (바이트 오프셋)
        offset: usize,
        /// 실패 사유
        reason: String,
    },

    /// 지원하지 않는 로그 형식
    #[error("unsupported log format: {0}")]
    UnsupportedFormat(String),

    /// 룰 파일 로딩 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 룰 파일 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 룰 유효성 검증 실패 (잘못된 패턴, 중복 ID 등)
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 룰 ID
        rule_id: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 수집기 에러 (입력 스트림 I/O 등)
    #[error("collector error: {source_type}: {reason}")]
    Collector {
        /// 수집 소스 유형 (stdin, reader 등)
        source_type: String,
        /// 에러 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 락 오염 (다른 태스크가 임계 구역에서 패닉)
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<LogPipelineError> for LogharborError {
    fn from(err: LogPipelineError) -> Self {
        match err {
            LogPipelineError::Config { field, reason } => {
                ConfigError::InvalidValue { field, reason }.into()
            }
            LogPipelineError::Parse { offset, reason, .. } => {
                ParseError::Failed { offset, reason }.into()
            }
            LogPipelineError::UnsupportedFormat(format) => {
                ParseError::UnsupportedFormat(format).into()
            }
            LogPipelineError::LockPoisoned(what) => StorageError::LockPoisoned(what).into(),
            LogPipelineError::Io(e) => LogharborError::Io(e),
            other => PipelineError::InitFailed(other.to_string()).into(),
        }
    }
}
