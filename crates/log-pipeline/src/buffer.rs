//! 수집 버퍼 -- 생산자와 워커 사이의 유한 큐 및 배치 조립
//!
//! [`IngestBuffer`]는 수집기가 넣은 레코드를 최대 `capacity`개까지 보관하고,
//! 워커가 [`take_batch`](IngestBuffer::take_batch)로 꺼낼 때
//! 크기(`batch_size`) 또는 시간(`batch_timeout`) 창 안에서 배치를 조립합니다.
//!
//! # 포화 정책
//! - [`submit`](IngestBuffer::submit): 가득 차면 즉시 `false`를 반환하고 레코드를 버립니다.
//! - [`put`](IngestBuffer::put): 공간이 생기거나 종료 신호가 올 때까지 대기합니다.
//!
//! # 종료
//! 생성 시 주입된 [`CancellationToken`]이 취소되면 대기 중인 `put`/`take_batch`가
//! 모두 깨어납니다. 이때 `take_batch`가 반환하는 빈 배치가 종료 신호입니다.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use logharbor_core::metrics as m;
use logharbor_core::types::LogRecord;

use crate::config::PipelineConfig;

/// 수집 버퍼
///
/// 여러 생산자와 여러 소비자가 외부 잠금 없이 공유합니다 (`Arc<IngestBuffer>`).
/// 같은 생산자가 넣은 레코드의 순서는 배치까지 유지됩니다.
pub struct IngestBuffer {
    /// 대기 중인 레코드
    queue: Mutex<VecDeque<Arc<LogRecord>>>,
    /// 최대 용량
    capacity: usize,
    /// 배치당 최대 레코드 수
    batch_size: usize,
    /// 첫 레코드 이후 배치를 채우는 최대 대기 시간
    batch_timeout: Duration,
    /// 레코드가 들어왔음을 알림 (소비자 대기)
    not_empty: Notify,
    /// 공간이 생겼음을 알림 (`put` 대기)
    not_full: Notify,
    /// 종료 신호
    shutdown: CancellationToken,
    /// 수락된 레코드 수
    submitted: AtomicU64,
    /// 포화로 버려진 레코드 수
    dropped: AtomicU64,
}

impl IngestBuffer {
    /// 새 수집 버퍼를 생성합니다.
    ///
    /// `capacity`와 `batch_size`는 최소 1로 보정됩니다.
    pub fn new(
        capacity: usize,
        batch_size: usize,
        batch_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(10_000))),
            capacity,
            batch_size: batch_size.max(1),
            batch_timeout,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            shutdown,
            submitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// 파이프라인 설정으로 버퍼를 생성합니다.
    pub fn from_config(config: &PipelineConfig, shutdown: CancellationToken) -> Self {
        Self::new(
            config.buffer_capacity,
            config.batch_size,
            config.batch_timeout(),
            shutdown,
        )
    }

    /// 대기 없이 레코드를 넣습니다.
    ///
    /// 버퍼가 가득 차 있으면 레코드를 버리고 `false`를 반환합니다.
    /// 드롭 로깅은 호출자의 몫입니다 (드롭 카운터는 여기서 증가).
    pub fn submit(&self, record: impl Into<Arc<LogRecord>>) -> bool {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            drop(queue);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::BUFFER_RECORDS_DROPPED_TOTAL).increment(1);
            return false;
        }
        queue.push_back(record.into());
        let len = queue.len();
        drop(queue);

        self.on_accepted(len);
        true
    }

    /// 공간이 생길 때까지 기다렸다가 레코드를 넣습니다.
    ///
    /// 종료 신호가 오면 넣지 않고 `false`를 반환합니다.
    pub async fn put(&self, record: impl Into<Arc<LogRecord>>) -> bool {
        let record = record.into();
        loop {
            // 상태 확인 전에 대기자로 등록해야 알림을 놓치지 않음
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shutdown.is_cancelled() {
                return false;
            }

            {
                let mut queue = self.lock();
                if queue.len() < self.capacity {
                    queue.push_back(Arc::clone(&record));
                    let len = queue.len();
                    drop(queue);
                    self.on_accepted(len);
                    return true;
                }
            }

            tokio::select! {
                () = &mut notified => {}
                () = self.shutdown.cancelled() => return false,
            }
        }
    }

    /// 배치를 꺼냅니다.
    ///
    /// 레코드가 하나 이상 생길 때까지 기다린 뒤, `batch_size`에 도달하거나
    /// `batch_timeout`이 지날 때까지 추가 레코드를 모읍니다.
    /// 빈 배치는 종료 신호가 왔고 버퍼가 비어 있을 때만 반환됩니다.
    pub async fn take_batch(&self) -> Vec<Arc<LogRecord>> {
        let mut batch = Vec::with_capacity(self.batch_size.min(1024));

        // 1단계: 첫 레코드 대기
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.drain_into(&mut batch) > 0 {
                break;
            }
            if self.shutdown.is_cancelled() {
                return batch;
            }

            tokio::select! {
                () = &mut notified => {}
                () = self.shutdown.cancelled() => {}
            }
        }

        // 2단계: 마감 시각까지 배치 채우기
        let deadline = Instant::now() + self.batch_timeout;
        while batch.len() < self.batch_size {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.drain_into(&mut batch) > 0 {
                continue;
            }
            if self.shutdown.is_cancelled() {
                break;
            }

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(deadline) => break,
                () = self.shutdown.cancelled() => break,
            }
        }

        tracing::trace!(size = batch.len(), "batch assembled");
        batch
    }

    /// 현재 대기 중인 레코드 수
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// 버퍼가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 남은 공간
    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.size())
    }

    /// 최대 용량
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 배치당 최대 레코드 수
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 수락된 총 레코드 수
    pub fn submitted_count(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// 포화로 버려진 총 레코드 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 버퍼 사용률을 0.0~1.0 범위로 반환합니다.
    pub fn utilization(&self) -> f64 {
        f64::from(u32::try_from(self.size()).unwrap_or(u32::MAX))
            / f64::from(u32::try_from(self.capacity).unwrap_or(u32::MAX))
    }

    /// 종료 신호가 왔는지 확인합니다.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<LogRecord>>> {
        // 큐 조작은 패닉하지 않으므로 오염된 락도 그대로 사용
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_accepted(&self, len: usize) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::BUFFER_RECORDS_SUBMITTED_TOTAL).increment(1);
        metrics::gauge!(m::BUFFER_SIZE).set(len as f64);
        self.not_empty.notify_one();
    }

    /// 배치에 남은 자리만큼 큐에서 옮기고 옮긴 개수를 반환합니다.
    fn drain_into(&self, batch: &mut Vec<Arc<LogRecord>>) -> usize {
        let mut queue = self.lock();
        let take = self
            .batch_size
            .saturating_sub(batch.len())
            .min(queue.len());
        batch.extend(queue.drain(..take));
        let remaining = queue.len();
        drop(queue);

        if take > 0 {
            metrics::gauge!(m::BUFFER_SIZE).set(remaining as f64);
            self.not_full.notify_waiters();
            if remaining > 0 {
                // 남은 레코드는 다른 소비자에게 넘김
                self.not_empty.notify_one();
            }
        }
        take
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logharbor_core::types::LogLevel;

    fn record(msg: &str) -> LogRecord {
        LogRecord::new("test", msg, LogLevel::Info, msg)
    }

    fn buffer(capacity: usize, batch_size: usize, timeout_ms: u64) -> IngestBuffer {
        IngestBuffer::new(
            capacity,
            batch_size,
            Duration::from_millis(timeout_ms),
            CancellationToken::new(),
        )
    }

    #[test]
    fn submit_respects_capacity() {
        let buf = buffer(2, 10, 100);
        assert!(buf.submit(record("a")));
        assert!(buf.submit(record("b")));
        assert!(!buf.submit(record("c")));

        assert_eq!(buf.size(), 2);
        assert_eq!(buf.remaining_capacity(), 0);
        assert_eq!(buf.submitted_count(), 2);
        assert_eq!(buf.dropped_count(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let buf = buffer(0, 0, 100);
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.batch_size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn take_batch_returns_full_batch_without_waiting() {
        let buf = buffer(100, 3, 5_000);
        for i in 0..5 {
            buf.submit(record(&format!("log{i}")));
        }

        let start = Instant::now();
        let batch = buf.take_batch().await;
        assert_eq!(batch.len(), 3);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(batch[0].message, "log0");
        assert_eq!(batch[2].message, "log2");
        assert_eq!(buf.size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn take_batch_returns_partial_batch_after_timeout() {
        let buf = buffer(100, 10, 500);
        buf.submit(record("only"));

        let start = Instant::now();
        let batch = buf.take_batch().await;
        assert_eq!(batch.len(), 1);
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn take_batch_collects_late_arrivals() {
        let buf = Arc::new(buffer(100, 3, 1_000));
        buf.submit(record("first"));

        let producer = Arc::clone(&buf);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            producer.submit(record("second"));
            tokio::time::sleep(Duration::from_millis(100)).await;
            producer.submit(record("third"));
        });

        let batch = buf.take_batch().await;
        let messages: Vec<_> = batch.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn take_batch_returns_empty_on_shutdown() {
        let token = CancellationToken::new();
        let buf = Arc::new(IngestBuffer::new(
            10,
            10,
            Duration::from_secs(60),
            token.clone(),
        ));

        let consumer = Arc::clone(&buf);
        let handle = tokio::spawn(async move { consumer.take_batch().await });

        tokio::task::yield_now().await;
        token.cancel();

        let batch = handle.await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn put_waits_for_space() {
        let buf = Arc::new(buffer(1, 1, 10));
        assert!(buf.put(record("a")).await);

        let producer = Arc::clone(&buf);
        let handle = tokio::spawn(async move { producer.put(record("b")).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        let batch = buf.take_batch().await;
        assert_eq!(batch[0].message, "a");

        assert!(handle.await.unwrap());
        assert_eq!(buf.size(), 1);
    }

    #[tokio::test]
    async fn put_returns_false_on_shutdown() {
        let token = CancellationToken::new();
        let buf = Arc::new(IngestBuffer::new(
            1,
            1,
            Duration::from_millis(10),
            token.clone(),
        ));
        assert!(buf.submit(record("a")));

        let producer = Arc::clone(&buf);
        let handle = tokio::spawn(async move { producer.put(record("b")).await });

        tokio::task::yield_now().await;
        token.cancel();

        assert!(!handle.await.unwrap());
        assert_eq!(buf.size(), 1);
    }

    #[test]
    fn utilization_calculation() {
        let buf = buffer(100, 10, 100);
        assert_eq!(buf.utilization(), 0.0);
        for i in 0..50 {
            buf.submit(record(&format!("log{i}")));
        }
        let util = buf.utilization();
        assert!(util > 0.49 && util < 0.51);
    }
}
