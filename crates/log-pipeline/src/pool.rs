//! 처리 워커 풀 -- 버퍼에서 배치를 꺼내 저장과 알림 평가를 구동합니다.
//!
//! 각 워커는 독립적인 tokio 태스크로 다음을 반복합니다.
//! 1. [`IngestBuffer::take_batch`]로 배치를 꺼냄
//! 2. [`IndexedStore::store_batch`]로 배치 저장
//! 3. 레코드마다 [`AlertEngine::evaluate`] 호출
//!
//! 실패한 배치는 로그만 남기고 재시도하지 않습니다 (at-most-once).
//! 종료 신호 이후에도 버퍼에 남은 레코드는 빈 배치가 나올 때까지 계속 처리합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logharbor_core::metrics as m;

use crate::alert::AlertEngine;
use crate::buffer::IngestBuffer;
use crate::store::IndexedStore;

/// 처리 워커 풀
pub struct ProcessingPool {
    buffer: Arc<IngestBuffer>,
    store: Arc<IndexedStore>,
    engine: Arc<AlertEngine>,
    shutdown: CancellationToken,
    processed: Arc<AtomicU64>,
    workers: Vec<JoinHandle<()>>,
}

impl ProcessingPool {
    /// 워커 풀을 생성합니다. 워커는 [`start`](Self::start)에서 스폰됩니다.
    ///
    /// `shutdown`은 버퍼에 주입된 것과 같은 토큰이어야 합니다.
    pub fn new(
        buffer: Arc<IngestBuffer>,
        store: Arc<IndexedStore>,
        engine: Arc<AlertEngine>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            store,
            engine,
            shutdown,
            processed: Arc::new(AtomicU64::new(0)),
            workers: Vec::new(),
        }
    }

    /// `worker_count`개의 워커를 스폰합니다 (최소 1).
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn start(&mut self, worker_count: usize) {
        let worker_count = worker_count.max(1);
        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                buffer: Arc::clone(&self.buffer),
                store: Arc::clone(&self.store),
                engine: Arc::clone(&self.engine),
                shutdown: self.shutdown.clone(),
                processed: Arc::clone(&self.processed),
            };
            self.workers.push(tokio::spawn(worker.run()));
        }
        tracing::info!(workers = worker_count, "processing pool started");
    }

    /// 종료 신호를 보내고 워커 종료를 기다립니다.
    ///
    /// `grace`는 풀 전체에 대한 하나의 마감 시각입니다. 그때까지 끝나지 않은
    /// 워커는 경고를 남기고 강제 중단합니다.
    pub async fn stop(&mut self, grace: Duration) {
        self.shutdown.cancel();
        let deadline = tokio::time::Instant::now() + grace;

        for (worker_id, mut handle) in self.workers.drain(..).enumerate() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(worker = worker_id, error = %e, "worker task failed");
                }
                Err(_) => {
                    tracing::warn!(
                        worker = worker_id,
                        grace_ms = grace.as_millis() as u64,
                        "worker did not stop within grace period, aborting"
                    );
                    handle.abort();
                }
            }
        }

        tracing::info!(
            processed = self.processed_count(),
            "processing pool stopped"
        );
    }

    /// 지금까지 처리된 레코드 수
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// 처리 카운터 핸들 (통계 보고 태스크와 공유)
    pub(crate) fn processed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.processed)
    }

    /// 살아 있는 워커가 있는지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.workers.iter().any(|w| !w.is_finished())
    }

    /// 스폰된 워커 수
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

struct Worker {
    id: usize,
    buffer: Arc<IngestBuffer>,
    store: Arc<IndexedStore>,
    engine: Arc<AlertEngine>,
    shutdown: CancellationToken,
    processed: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker = self.id, "worker started");

        loop {
            let batch = self.buffer.take_batch().await;
            if batch.is_empty() {
                if self.shutdown.is_cancelled() {
                    break;
                }
                continue;
            }

            let started = Instant::now();
            if let Err(e) = self.store.store_batch(&batch) {
                metrics::counter!(m::POOL_BATCH_FAILURES_TOTAL).increment(1);
                tracing::error!(
                    worker = self.id,
                    batch_size = batch.len(),
                    error = %e,
                    "failed to store batch, dropping"
                );
                continue;
            }

            let mut alerts = 0;
            for record in &batch {
                alerts += self.engine.evaluate(record);
            }

            let size = batch.len() as u64;
            self.processed.fetch_add(size, Ordering::Relaxed);
            metrics::counter!(m::POOL_RECORDS_PROCESSED_TOTAL).increment(size);
            metrics::counter!(m::POOL_BATCHES_PROCESSED_TOTAL).increment(1);
            metrics::histogram!(m::POOL_BATCH_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());

            tracing::debug!(
                worker = self.id,
                batch_size = size,
                alerts,
                "batch processed"
            );
        }

        tracing::debug!(worker = self.id, "worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use logharbor_core::types::{LogLevel, LogRecord};

    use crate::alert::{AlertEvent, AlertListener, AlertRule, ListenerError};

    fn components(
        buffer_capacity: usize,
    ) -> (
        Arc<IngestBuffer>,
        Arc<IndexedStore>,
        Arc<AlertEngine>,
        CancellationToken,
    ) {
        let token = CancellationToken::new();
        let buffer = Arc::new(IngestBuffer::new(
            buffer_capacity,
            10,
            Duration::from_millis(20),
            token.clone(),
        ));
        let store = Arc::new(IndexedStore::new(1000));
        let engine = Arc::new(AlertEngine::new());
        (buffer, store, engine, token)
    }

    #[tokio::test]
    async fn workers_store_and_evaluate_everything() {
        let (buffer, store, engine, token) = components(1000);
        engine
            .add_rule(AlertRule::new("err", "err", "error").unwrap())
            .unwrap();

        let mut pool = ProcessingPool::new(buffer.clone(), store.clone(), engine.clone(), token);
        pool.start(3);
        assert_eq!(pool.worker_count(), 3);

        for i in 0..100 {
            let msg = if i % 4 == 0 { "error here" } else { "fine" };
            assert!(buffer.submit(LogRecord::new("app", msg, LogLevel::Info, msg)));
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.processed_count() < 100 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("all records should be processed");

        pool.stop(Duration::from_secs(1)).await;
        assert!(!pool.is_running());
        assert_eq!(store.total_count(), 100);
        assert_eq!(engine.rule("err").unwrap().trigger_count(), 25);
    }

    #[tokio::test]
    async fn stop_drains_buffered_records() {
        let (buffer, store, engine, token) = components(100);
        for i in 0..30 {
            buffer.submit(LogRecord::new("app", "", LogLevel::Info, format!("m{i}")));
        }

        let mut pool = ProcessingPool::new(buffer.clone(), store.clone(), engine, token);
        pool.start(1);
        pool.stop(Duration::from_secs(2)).await;

        assert_eq!(pool.processed_count(), 30);
        assert!(buffer.is_empty());
        assert_eq!(store.len(), 30);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn stop_shares_one_deadline_across_stuck_workers() {
        struct Stalling {
            entered: AtomicUsize,
            released: AtomicBool,
        }

        impl AlertListener for Stalling {
            fn on_alert(&self, _event: &AlertEvent) -> Result<(), ListenerError> {
                self.entered.fetch_add(1, Ordering::SeqCst);
                let started = Instant::now();
                while !self.released.load(Ordering::SeqCst)
                    && started.elapsed() < Duration::from_secs(10)
                {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            }
        }

        let (buffer, store, engine, token) = components(100);
        engine
            .add_rule(AlertRule::new("all", "all", ".*").unwrap())
            .unwrap();
        let stalling = Arc::new(Stalling {
            entered: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        });
        engine.add_listener(stalling.clone());

        for i in 0..40 {
            buffer.submit(LogRecord::new("app", "", LogLevel::Info, format!("m{i}")));
        }

        let mut pool = ProcessingPool::new(buffer, store, engine, token);
        pool.start(4);

        tokio::time::timeout(Duration::from_secs(5), async {
            while stalling.entered.load(Ordering::SeqCst) < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("every worker should be stuck in the listener");

        let started = Instant::now();
        pool.stop(Duration::from_millis(300)).await;
        let elapsed = started.elapsed();

        stalling.released.store(true, Ordering::SeqCst);

        assert!(
            elapsed < Duration::from_millis(900),
            "stop took {elapsed:?} with four stuck workers"
        );
        assert!(!pool.is_running());
        assert_eq!(pool.worker_count(), 0);
    }

    #[tokio::test]
    async fn worker_survives_panicking_listener() {
        struct PanicsOnBoom;

        impl AlertListener for PanicsOnBoom {
            fn on_alert(&self, event: &AlertEvent) -> Result<(), ListenerError> {
                if event.record.message == "boom" {
                    panic!("listener exploded");
                }
                Ok(())
            }
        }

        let (buffer, store, engine, token) = components(100);
        engine
            .add_rule(AlertRule::new("all", "all", ".*").unwrap())
            .unwrap();
        engine.add_listener(Arc::new(PanicsOnBoom));

        let mut pool = ProcessingPool::new(buffer.clone(), store.clone(), engine.clone(), token);
        pool.start(1);

        for msg in ["before", "boom", "after"] {
            assert!(buffer.submit(LogRecord::new("app", msg, LogLevel::Info, msg)));
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.processed_count() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("records after the panic should still be processed");
        assert!(pool.is_running());

        assert!(buffer.submit(LogRecord::new("app", "later", LogLevel::Info, "later")));
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.processed_count() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker should keep running");

        pool.stop(Duration::from_secs(1)).await;
        assert_eq!(store.total_count(), 4);
        assert_eq!(engine.stats().listener_failures, 1);
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let (buffer, store, engine, token) = components(10);
        let mut pool = ProcessingPool::new(buffer, store, engine, token.clone());
        pool.stop(Duration::from_millis(10)).await;
        assert!(token.is_cancelled());
        assert_eq!(pool.processed_count(), 0);
    }
}
