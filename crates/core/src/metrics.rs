//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logharbor_`
//! - 구성 요소: `buffer_`, `pool_`, `store_`, `alert_`, `collector_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(logharbor_core::metrics::POOL_RECORDS_PROCESSED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 로그 레벨 레이블 키 (TRACE ~ FATAL)
pub const LABEL_LEVEL: &str = "level";

/// 규칙 ID 레이블 키
pub const LABEL_RULE: &str = "rule";

// ─── Buffer 메트릭 ──────────────────────────────────────────────────

/// Buffer: 제출된 레코드 수 (counter)
pub const BUFFER_RECORDS_SUBMITTED_TOTAL: &str = "logharbor_buffer_records_submitted_total";

/// Buffer: 버퍼 포화로 드롭된 레코드 수 (counter)
pub const BUFFER_RECORDS_DROPPED_TOTAL: &str = "logharbor_buffer_records_dropped_total";

/// Buffer: 현재 대기 중인 레코드 수 (gauge)
pub const BUFFER_SIZE: &str = "logharbor_buffer_size";

// ─── Processing Pool 메트릭 ─────────────────────────────────────────

/// Pool: 처리된 레코드 수 (counter)
pub const POOL_RECORDS_PROCESSED_TOTAL: &str = "logharbor_pool_records_processed_total";

/// Pool: 처리된 배치 수 (counter)
pub const POOL_BATCHES_PROCESSED_TOTAL: &str = "logharbor_pool_batches_processed_total";

/// Pool: 처리에 실패해 버려진 배치 수 (counter)
pub const POOL_BATCH_FAILURES_TOTAL: &str = "logharbor_pool_batch_failures_total";

/// Pool: 배치 처리 지연 시간 (histogram, 초)
pub const POOL_BATCH_DURATION_SECONDS: &str = "logharbor_pool_batch_duration_seconds";

// ─── Store 메트릭 ───────────────────────────────────────────────────

/// Store: 저장된 레코드 수 (counter)
pub const STORE_RECORDS_STORED_TOTAL: &str = "logharbor_store_records_stored_total";

/// Store: 용량 초과로 축출된 레코드 수 (counter)
pub const STORE_RECORDS_EVICTED_TOTAL: &str = "logharbor_store_records_evicted_total";

/// Store: 현재 보관 중인 레코드 수 (gauge)
pub const STORE_SIZE: &str = "logharbor_store_size";

/// Store: 역색인 term 수 (gauge)
pub const STORE_INDEX_TERMS: &str = "logharbor_store_index_terms";

// ─── Alert 메트릭 ───────────────────────────────────────────────────

/// Alert: 트리거된 알림 수 (counter, label: severity)
pub const ALERT_TRIGGERED_TOTAL: &str = "logharbor_alert_triggered_total";

/// Alert: 리스너 전달 실패 수 (counter)
pub const ALERT_LISTENER_FAILURES_TOTAL: &str = "logharbor_alert_listener_failures_total";

/// Alert: 등록된 규칙 수 (gauge)
pub const ALERT_RULES_LOADED: &str = "logharbor_alert_rules_loaded";

// ─── Collector 메트릭 ───────────────────────────────────────────────

/// Collector: 읽은 원시 라인 수 (counter)
pub const COLLECTOR_LINES_READ_TOTAL: &str = "logharbor_collector_lines_read_total";

/// Collector: 파싱 실패 수 (counter)
pub const COLLECTOR_PARSE_ERRORS_TOTAL: &str = "logharbor_collector_parse_errors_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logharbor_daemon_uptime_seconds";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 배치 처리 지연 시간 히스토그램 버킷 (초)
///
/// 100us ~ 10s 범위
pub const BATCH_DURATION_BUCKETS: [f64; 10] = [
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
/// 일반적으로 `logharbor-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Buffer
    describe_counter!(
        BUFFER_RECORDS_SUBMITTED_TOTAL,
        "Total number of records accepted by the ingest buffer"
    );
    describe_counter!(
        BUFFER_RECORDS_DROPPED_TOTAL,
        "Total number of records dropped because the ingest buffer was full"
    );
    describe_gauge!(BUFFER_SIZE, "Current number of records waiting in the ingest buffer");

    // Processing pool
    describe_counter!(
        POOL_RECORDS_PROCESSED_TOTAL,
        "Total number of records handed to storage and alert evaluation"
    );
    describe_counter!(
        POOL_BATCHES_PROCESSED_TOTAL,
        "Total number of batches processed by the worker pool"
    );
    describe_counter!(
        POOL_BATCH_FAILURES_TOTAL,
        "Total number of batches abandoned after a processing failure"
    );
    describe_histogram!(
        POOL_BATCH_DURATION_SECONDS,
        "Time to store and evaluate a single batch in seconds"
    );

    // Store
    describe_counter!(
        STORE_RECORDS_STORED_TOTAL,
        "Total number of records inserted into the indexed store"
    );
    describe_counter!(
        STORE_RECORDS_EVICTED_TOTAL,
        "Total number of records evicted from the indexed store"
    );
    describe_gauge!(STORE_SIZE, "Current number of records retained by the store");
    describe_gauge!(STORE_INDEX_TERMS, "Current number of terms in the inverted index");

    // Alert
    describe_counter!(
        ALERT_TRIGGERED_TOTAL,
        "Total number of alert rule triggers by severity"
    );
    describe_counter!(
        ALERT_LISTENER_FAILURES_TOTAL,
        "Total number of alert listener notification failures"
    );
    describe_gauge!(ALERT_RULES_LOADED, "Number of registered alert rules");

    // Collector
    describe_counter!(
        COLLECTOR_LINES_READ_TOTAL,
        "Total number of raw lines read by collectors"
    );
    describe_counter!(
        COLLECTOR_PARSE_ERRORS_TOTAL,
        "Total number of raw lines no parser could handle"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
}
