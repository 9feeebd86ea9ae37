//! 에러 타입 -- 도메인별 에러 정의

/// logharbor 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogharborError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline is not running")]
    NotRunning,

    /// 정지 후 재시작 시도
    #[error("pipeline was stopped and cannot be restarted")]
    AlreadyStopped,
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 지원하지 않는 형식
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 파싱 실패
    #[error("parse failed at offset {offset}: {reason}")]
    Failed { offset: usize, reason: String },

    /// 입력 데이터 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 락이 오염됨 (다른 스레드가 임계 구역에서 패닉)
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts() {
        let err: LogharborError = ConfigError::InvalidValue {
            field: "buffer.capacity".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("buffer.capacity"));
        assert!(matches!(err, LogharborError::Config(_)));
    }

    #[test]
    fn pipeline_error_display() {
        let err: LogharborError = PipelineError::AlreadyRunning.into();
        assert_eq!(err.to_string(), "pipeline error: pipeline is already running");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: LogharborError = io.into();
        assert!(matches!(err, LogharborError::Io(_)));
    }
}
