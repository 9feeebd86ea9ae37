//! 파이프라인 오케스트레이션 -- 버퍼/스토어/알림 엔진/워커 풀의 생명주기를 관리합니다.
//!
//! [`LogPipeline`]은 core의 [`Pipeline`](logharbor_core::pipeline::Pipeline) trait을 구현하여
//! `logharbor-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! LineCollector -> IngestBuffer -> ProcessingPool -+-> IndexedStore  (search/filter)
//!                                                  +-> AlertEngine   -> AlertListener...
//! ```
//!
//! 모든 구성 요소는 빌더에서 한 번 만들어지고 `Arc`로 공유됩니다. 조회/구독 계층은
//! [`LogPipeline::store`], [`LogPipeline::alert_engine`] 핸들을 통해 접근합니다.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logharbor_core::error::{LogharborError, PipelineError};
use logharbor_core::pipeline::{HealthStatus, Pipeline};
use logharbor_core::types::LogRecord;

use crate::alert::{AlertEngine, AlertListener, RuleLoader};
use crate::buffer::IngestBuffer;
use crate::collector::LineCollector;
use crate::config::PipelineConfig;
use crate::error::LogPipelineError;
use crate::monitor::{PipelineStats, StatsSources, spawn_stats_reporter};
use crate::parser::ParserRouter;
use crate::pool::ProcessingPool;
use crate::store::IndexedStore;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨 (종료 토큰이 취소되어 재시작 불가)
    Stopped,
}

/// 로그 파이프라인
///
/// # 사용 예시
/// ```ignore
/// use logharbor_core::pipeline::Pipeline;
/// use logharbor_pipeline::{LogPipelineBuilder, LoggingListener};
///
/// let mut pipeline = LogPipelineBuilder::new()
///     .config(config)
///     .listener(Arc::new(LoggingListener))
///     .build()?;
///
/// pipeline.start().await?;
/// pipeline.collector("stdin").run(tokio::io::BufReader::new(tokio::io::stdin())).await?;
/// pipeline.stop().await?;
/// ```
pub struct LogPipeline {
    config: PipelineConfig,
    state: PipelineState,
    buffer: Arc<IngestBuffer>,
    store: Arc<IndexedStore>,
    engine: Arc<AlertEngine>,
    router: Arc<ParserRouter>,
    pool: ProcessingPool,
    shutdown: CancellationToken,
    /// 백그라운드 태스크 핸들 (통계 보고)
    tasks: Vec<JoinHandle<()>>,
}

impl LogPipeline {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 수집 버퍼 핸들
    pub fn buffer(&self) -> Arc<IngestBuffer> {
        Arc::clone(&self.buffer)
    }

    /// 색인 스토어 핸들
    pub fn store(&self) -> Arc<IndexedStore> {
        Arc::clone(&self.store)
    }

    /// 알림 엔진 핸들
    pub fn alert_engine(&self) -> Arc<AlertEngine> {
        Arc::clone(&self.engine)
    }

    /// 파서 라우터 핸들
    pub fn parser_router(&self) -> Arc<ParserRouter> {
        Arc::clone(&self.router)
    }

    /// 종료 토큰 (취소하면 수집기와 워커가 모두 멈춤)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// 워커가 처리한 레코드 수
    pub fn processed_count(&self) -> u64 {
        self.pool.processed_count()
    }

    /// 버퍼 사용률
    pub fn buffer_utilization(&self) -> f64 {
        self.buffer.utilization()
    }

    /// 레코드를 대기 없이 제출합니다. 버퍼가 가득 차면 `false`.
    pub fn submit(&self, record: impl Into<Arc<LogRecord>>) -> bool {
        self.buffer.submit(record)
    }

    /// 설정된 포화 정책을 따르는 라인 수집기를 만듭니다.
    pub fn collector(&self, source: impl Into<String>) -> LineCollector {
        LineCollector::new(
            source,
            Arc::clone(&self.router),
            Arc::clone(&self.buffer),
            self.shutdown.clone(),
        )
        .with_policy(self.config.backpressure)
        .with_max_line_length(self.config.max_line_length)
    }

    fn stats_sources(&self) -> StatsSources {
        StatsSources {
            buffer: Arc::clone(&self.buffer),
            store: Arc::clone(&self.store),
            engine: Arc::clone(&self.engine),
            processed: self.pool.processed_counter(),
        }
    }

    /// 현재 상태 스냅샷
    pub fn stats(&self) -> PipelineStats {
        self.stats_sources().collect()
    }

    /// 설정된 규칙 파일(또는 디렉토리)을 로드해 엔진에 등록합니다.
    ///
    /// 기존 규칙과 ID가 겹치면 파일의 규칙은 하나도 등록되지 않습니다.
    async fn load_configured_rules(&self) -> Result<usize, LogPipelineError> {
        let path = self.config.rules_file.trim();
        if path.is_empty() {
            return Ok(0);
        }

        let rules = RuleLoader::load_path(path).await?;
        let count = self.engine.add_rules(rules)?;
        tracing::info!(path, rules = count, "loaded rules file");
        Ok(count)
    }
}

impl Pipeline for LogPipeline {
    async fn start(&mut self) -> Result<(), LogharborError> {
        match self.state {
            PipelineState::Running => return Err(PipelineError::AlreadyRunning.into()),
            PipelineState::Stopped => return Err(PipelineError::AlreadyStopped.into()),
            PipelineState::Initialized => {}
        }

        tracing::info!("starting log pipeline");

        // 1. 규칙 로드
        self.load_configured_rules().await?;

        // 2. 워커 스폰
        self.pool.start(self.config.workers);

        // 3. 통계 보고 태스크
        self.tasks.push(spawn_stats_reporter(
            self.stats_sources(),
            self.config.stats_interval(),
            self.shutdown.clone(),
        ));

        self.state = PipelineState::Running;
        tracing::info!(
            workers = self.config.workers,
            rules = self.engine.rule_count(),
            buffer_capacity = self.buffer.capacity(),
            store_capacity = self.store.capacity(),
            "log pipeline started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LogharborError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping log pipeline");

        // 1. 종료 신호 + 워커 드레인 (유예 시간 초과 시 중단)
        self.pool.stop(self.config.shutdown_grace()).await;

        // 2. 백그라운드 태스크 종료 대기
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        self.state = PipelineState::Stopped;
        tracing::info!(
            processed = self.pool.processed_count(),
            stored = self.store.total_count(),
            dropped = self.buffer.dropped_count(),
            "log pipeline stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let utilization = self.buffer.utilization();
                if utilization > 0.9 {
                    HealthStatus::Degraded(format!(
                        "buffer utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 로그 파이프라인 빌더
///
/// 구성 요소를 만들고 같은 종료 토큰을 버퍼/워커 풀/수집기에 주입합니다.
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    router: Option<ParserRouter>,
    listeners: Vec<Arc<dyn AlertListener>>,
    shutdown: Option<CancellationToken>,
}

impl LogPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            router: None,
            listeners: Vec::new(),
            shutdown: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 파서 라우터를 지정합니다. 지정하지 않으면 기본 파서 세트를 사용합니다.
    pub fn parser_router(mut self, router: ParserRouter) -> Self {
        self.router = Some(router);
        self
    }

    /// 알림 리스너를 추가합니다.
    pub fn listener(mut self, listener: Arc<dyn AlertListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// 외부 종료 토큰을 지정합니다. 지정하지 않으면 새 토큰을 만듭니다.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<LogPipeline, LogPipelineError> {
        self.config.validate()?;

        let shutdown = self.shutdown.unwrap_or_default();
        let buffer = Arc::new(IngestBuffer::from_config(&self.config, shutdown.clone()));
        let store = Arc::new(IndexedStore::new(self.config.store_capacity));

        let engine = if self.config.default_rules {
            AlertEngine::with_default_rules()?
        } else {
            AlertEngine::new()
        };
        for listener in self.listeners {
            engine.add_listener(listener);
        }
        let engine = Arc::new(engine);

        let pool = ProcessingPool::new(
            Arc::clone(&buffer),
            Arc::clone(&store),
            Arc::clone(&engine),
            shutdown.clone(),
        );

        Ok(LogPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            buffer,
            store,
            engine,
            router: Arc::new(self.router.unwrap_or_default()),
            pool,
            shutdown,
            tasks: Vec::new(),
        })
    }
}

impl Default for LogPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
