#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`buffer`]: 생산자와 워커 사이의 유한 큐 ([`IngestBuffer`])
//! - [`store`]: 역색인 기반 레코드 스토어 ([`IndexedStore`])
//! - [`alert`]: 알림 규칙 엔진과 리스너 ([`AlertEngine`])
//! - [`pool`]: 처리 워커 풀 ([`ProcessingPool`])
//! - [`parser`]: 형식별 파서 및 라우터
//! - [`collector`]: 라인 수집기
//! - [`filter`]: 레코드 필터
//! - [`monitor`]: 통계 스냅샷과 보고 태스크
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입

pub mod alert;
pub mod buffer;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod store;

pub mod collector;
pub mod filter;
pub mod monitor;
pub mod parser;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{LogPipeline, LogPipelineBuilder};

// 설정
pub use config::{BackpressurePolicy, PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::LogPipelineError;

// 핵심 구성 요소
pub use buffer::IngestBuffer;
pub use pool::ProcessingPool;
pub use store::IndexedStore;

// 알림
pub use alert::{
    AlertEngine, AlertEvent, AlertListener, AlertRule, AlertStats, ListenerError,
    LoggingListener, QueuedListener, RuleDefinition, RuleField, RuleLoader,
};

// 파서/수집기/필터
pub use collector::{CollectorStats, LineCollector};
pub use filter::RecordFilter;
pub use parser::{JsonLogParser, ParserRouter, TextLogParser};

// 통계
pub use monitor::PipelineStats;
