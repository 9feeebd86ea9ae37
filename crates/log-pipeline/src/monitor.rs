//! 통계 보고 -- 파이프라인 상태를 주기적으로 로그와 게이지로 내보냅니다.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logharbor_core::metrics as m;
use logharbor_core::types::LogLevel;

use crate::alert::{AlertEngine, AlertStats};
use crate::buffer::IngestBuffer;
use crate::store::IndexedStore;

/// 파이프라인 상태 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// 버퍼에 대기 중인 레코드 수
    pub buffer_size: usize,
    /// 버퍼 포화로 버려진 레코드 누계
    pub buffer_dropped: u64,
    /// 워커가 처리한 레코드 누계
    pub processed: u64,
    /// 스토어에 삽입된 레코드 누계
    pub store_total: u64,
    /// 스토어가 보관 중인 레코드 수
    pub store_size: usize,
    /// 레벨별 보관 레코드 수
    pub levels: BTreeMap<LogLevel, u64>,
    /// 알림 통계
    pub alerts: AlertStats,
}

/// 스냅샷을 만드는 데 필요한 구성 요소 핸들
#[derive(Clone)]
pub struct StatsSources {
    pub buffer: Arc<IngestBuffer>,
    pub store: Arc<IndexedStore>,
    pub engine: Arc<AlertEngine>,
    pub processed: Arc<AtomicU64>,
}

impl StatsSources {
    /// 현재 상태를 수집합니다. 부수 효과는 없습니다.
    pub fn collect(&self) -> PipelineStats {
        PipelineStats {
            buffer_size: self.buffer.size(),
            buffer_dropped: self.buffer.dropped_count(),
            processed: self.processed.load(Ordering::Relaxed),
            store_total: self.store.total_count(),
            store_size: self.store.len(),
            levels: self.store.level_statistics(),
            alerts: self.engine.stats(),
        }
    }
}

/// 주기적으로 통계를 기록하는 태스크를 스폰합니다.
///
/// 첫 보고는 `interval` 뒤에 나가며, 종료 신호에서 멈춥니다.
pub fn spawn_stats_reporter(
    sources: StatsSources,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => report(&sources.collect()),
                () = shutdown.cancelled() => {
                    tracing::debug!("stats reporter shutting down");
                    break;
                }
            }
        }
    })
}

fn report(stats: &PipelineStats) {
    metrics::gauge!(m::BUFFER_SIZE).set(stats.buffer_size as f64);
    metrics::gauge!(m::STORE_SIZE).set(stats.store_size as f64);

    let levels = stats
        .levels
        .iter()
        .map(|(level, count)| format!("{level}={count}"))
        .collect::<Vec<_>>()
        .join(" ");

    tracing::info!(
        buffer_size = stats.buffer_size,
        buffer_dropped = stats.buffer_dropped,
        processed = stats.processed,
        store_total = stats.store_total,
        store_size = stats.store_size,
        levels = levels.as_str(),
        alert_rules = stats.alerts.rule_count,
        alert_triggers = stats.alerts.total_triggers,
        listener_failures = stats.alerts.listener_failures,
        "pipeline stats"
    );
}
