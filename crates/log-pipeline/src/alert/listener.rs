//! 알림 리스너 -- 알림 구독 인터페이스와 기본 구현
//!
//! [`AlertListener::on_alert`]는 여러 워커 태스크에서 동시에 호출될 수 있으므로
//! 구현체는 스스로 스레드 안전해야 합니다. 순서 보장이나 단일 소비자가 필요하면
//! [`QueuedListener`]로 감싸 전달을 한 태스크로 직렬화합니다.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use logharbor_core::metrics as m;

use super::event::AlertEvent;

/// 리스너 전달 실패
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// 전달 실패 (외부 전송 계층 오류 등)
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// 큐 포화
    #[error("listener queue full (capacity {capacity})")]
    QueueFull {
        /// 큐 용량
        capacity: usize,
    },

    /// 소비자 종료
    #[error("listener closed")]
    Closed,

    /// 리스너가 패닉
    #[error("listener panicked: {0}")]
    Panicked(String),
}

/// 알림 구독자
pub trait AlertListener: Send + Sync {
    /// 로그와 메트릭에 쓰는 리스너 이름
    fn name(&self) -> &str {
        "listener"
    }

    /// 규칙이 트리거될 때마다 호출됩니다.
    ///
    /// 에러를 반환해도 다른 리스너와 이후 규칙 평가에는 영향이 없습니다.
    fn on_alert(&self, event: &AlertEvent) -> Result<(), ListenerError>;
}

/// 리스너를 호출하고 패닉을 [`ListenerError::Panicked`]로 바꿉니다.
pub(crate) fn deliver(
    listener: &dyn AlertListener,
    event: &AlertEvent,
) -> Result<(), ListenerError> {
    panic::catch_unwind(AssertUnwindSafe(|| listener.on_alert(event)))
        .unwrap_or_else(|payload| {
            Err(ListenerError::Panicked(panic_message(payload.as_ref())))
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// 알림을 tracing 이벤트로 남기는 리스너
///
/// 심각도와 무관하게 `warn` 레벨로 기록하며, 심각도는 필드로 남깁니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl AlertListener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_alert(&self, event: &AlertEvent) -> Result<(), ListenerError> {
        tracing::warn!(
            alert_id = %event.id,
            rule_id = event.rule.id(),
            rule = event.rule.name(),
            severity = %event.severity(),
            source = %event.record.source,
            level = %event.record.level,
            "ALERT TRIGGERED: {}",
            event.message
        );
        Ok(())
    }
}

/// 단일 소비자 큐로 전달을 직렬화하는 어댑터
///
/// `on_alert`는 이벤트를 유한 채널에 넣기만 하고, 별도 태스크가 감싼 리스너를
/// 순서대로 호출합니다. 큐가 가득 차면 [`ListenerError::QueueFull`]을 반환합니다.
/// 어댑터가 drop되면 채널이 닫히고 소비자 태스크는 남은 이벤트를 처리한 뒤 종료합니다.
pub struct QueuedListener {
    name: String,
    tx: mpsc::Sender<AlertEvent>,
    capacity: usize,
    consumer: JoinHandle<()>,
}

impl QueuedListener {
    /// 어댑터를 만들고 소비자 태스크를 스폰합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn spawn(inner: Arc<dyn AlertListener>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let name = format!("queued:{}", inner.name());
        let (tx, mut rx) = mpsc::channel::<AlertEvent>(capacity);

        let consumer_name = name.clone();
        let consumer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = deliver(&*inner, &event) {
                    metrics::counter!(m::ALERT_LISTENER_FAILURES_TOTAL).increment(1);
                    tracing::error!(
                        listener = consumer_name.as_str(),
                        rule_id = event.rule.id(),
                        error = %e,
                        "queued alert delivery failed"
                    );
                }
            }
            tracing::debug!(listener = consumer_name.as_str(), "queued listener drained");
        });

        Self {
            name,
            tx,
            capacity,
            consumer,
        }
    }

    /// 큐에 대기 중인 이벤트 수
    pub fn pending(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// 소비자 태스크가 종료되었는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.consumer.is_finished()
    }
}

impl AlertListener for QueuedListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_alert(&self, event: &AlertEvent) -> Result<(), ListenerError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ListenerError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => ListenerError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use logharbor_core::types::{LogLevel, LogRecord};

    use crate::alert::rule::AlertRule;

    struct Collecting {
        seen: Mutex<Vec<String>>,
    }

    impl AlertListener for Collecting {
        fn name(&self) -> &str {
            "collecting"
        }

        fn on_alert(&self, event: &AlertEvent) -> Result<(), ListenerError> {
            self.seen.lock().unwrap().push(event.record.message.clone());
            Ok(())
        }
    }

    fn event(msg: &str) -> AlertEvent {
        let rule = Arc::new(AlertRule::new("r", "rule", ".*").unwrap());
        let record = Arc::new(LogRecord::new("app", msg, LogLevel::Info, msg));
        AlertEvent::new(rule, record)
    }

    struct Exploding;

    impl AlertListener for Exploding {
        fn on_alert(&self, event: &AlertEvent) -> Result<(), ListenerError> {
            if event.record.message == "boom" {
                panic!("listener exploded");
            }
            Ok(())
        }
    }

    #[test]
    fn deliver_turns_panic_into_error() {
        assert!(deliver(&Exploding, &event("fine")).is_ok());

        let err = deliver(&Exploding, &event("boom")).unwrap_err();
        match err {
            ListenerError::Panicked(msg) => assert_eq!(msg, "listener exploded"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn queued_consumer_survives_panicking_listener() {
        struct PanicsOnBoom(Collecting);

        impl AlertListener for PanicsOnBoom {
            fn on_alert(&self, event: &AlertEvent) -> Result<(), ListenerError> {
                if event.record.message == "boom" {
                    panic!("listener exploded");
                }
                self.0.on_alert(event)
            }
        }

        let inner = Arc::new(PanicsOnBoom(Collecting {
            seen: Mutex::new(Vec::new()),
        }));
        let queued = QueuedListener::spawn(inner.clone(), 16);

        for msg in ["one", "boom", "two"] {
            queued.on_alert(&event(msg)).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while inner.0.seen.lock().unwrap().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("consumer should keep running after a panic");

        assert_eq!(*inner.0.seen.lock().unwrap(), ["one", "two"]);
    }

    #[test]
    fn logging_listener_never_fails() {
        let listener = LoggingListener;
        assert!(listener.on_alert(&event("hello")).is_ok());
        assert_eq!(listener.name(), "logging");
    }

    #[tokio::test]
    async fn queued_listener_delivers_in_order() {
        let inner = Arc::new(Collecting {
            seen: Mutex::new(Vec::new()),
        });
        let queued = QueuedListener::spawn(inner.clone(), 16);
        assert_eq!(queued.name(), "queued:collecting");

        for msg in ["one", "two", "three"] {
            queued.on_alert(&event(msg)).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while inner.seen.lock().unwrap().len() < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("events should be delivered");

        assert_eq!(*inner.seen.lock().unwrap(), ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn queued_listener_reports_full_queue() {
        let inner = Arc::new(Collecting {
            seen: Mutex::new(Vec::new()),
        });
        // current_thread 런타임에서는 양보 전까지 소비자가 실행되지 않음
        let queued = QueuedListener::spawn(inner, 1);
        queued.on_alert(&event("one")).unwrap();

        let err = queued.on_alert(&event("two")).unwrap_err();
        assert!(matches!(err, ListenerError::QueueFull { capacity: 1 }));
        assert_eq!(queued.pending(), 1);
    }
}
