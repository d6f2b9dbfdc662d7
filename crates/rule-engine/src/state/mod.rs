//! 스냅샷 상태 관리와 핫 리로드
//!
//! [`ConfigurationStateUpdater`]는 정의 저장소에서 규칙/파이프라인을 읽어 해석하고,
//! 결과 스냅샷을 원자적으로 교체합니다.
//!
//! - 읽기: `ArcSwapOption::load_full` (락 없음)
//! - 쓰기: 리로드는 `tokio::sync::Mutex`로 직렬화되며 버전 카운터도 이 락이 보호
//! - 리로드 실패 시 이전 스냅샷을 유지
//! - 사라진 ID의 계측기 정리는 스냅샷 교체 이후에만 수행

mod loader;
mod source;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use pipewright_core::metrics as names;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use loader::DirectoryDefinitionSource;
pub use source::InMemoryDefinitionSource;

use crate::config::EngineConfig;
use crate::error::RuleEngineError;
use crate::metrics::MetricRegistry;
use crate::parser::RuleParser;
use crate::resolver::{Definitions, PipelineResolver, Snapshot};

/// 현재 스냅샷을 제공하는 쪽
pub trait SnapshotProvider {
    fn current(&self) -> Option<Arc<Snapshot>>;
}

impl SnapshotProvider for Arc<Snapshot> {
    fn current(&self) -> Option<Arc<Snapshot>> {
        Some(Arc::clone(self))
    }
}

impl SnapshotProvider for Option<Arc<Snapshot>> {
    fn current(&self) -> Option<Arc<Snapshot>> {
        self.clone()
    }
}

impl<T: SnapshotProvider + ?Sized> SnapshotProvider for &T {
    fn current(&self) -> Option<Arc<Snapshot>> {
        (**self).current()
    }
}

/// 규칙/파이프라인 정의 저장소
pub trait DefinitionSource: Send + Sync + 'static {
    /// 현재 정의 전체를 읽습니다.
    fn load(&self) -> impl Future<Output = Result<Definitions, RuleEngineError>> + Send;
}

/// 리로드 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    /// 정의가 추가/변경됨
    Update(Vec<String>),
    /// 정의가 삭제됨
    Delete(Vec<String>),
}

/// 스냅샷 갱신기
pub struct ConfigurationStateUpdater<S> {
    name: String,
    source: S,
    resolver: PipelineResolver,
    metrics: Arc<dyn MetricRegistry>,
    current: ArcSwapOption<Snapshot>,
    /// 리로드 직렬화 락 + 마지막으로 게시한 버전
    version: Mutex<u64>,
    init_retry_attempts: u32,
    init_retry_interval: Duration,
}

impl<S: DefinitionSource> ConfigurationStateUpdater<S> {
    pub fn new(
        source: S,
        parser: RuleParser,
        metrics: Arc<dyn MetricRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            name: "pipelines".to_owned(),
            source,
            resolver: PipelineResolver::new(parser, Arc::clone(&metrics), config),
            metrics,
            current: ArcSwapOption::empty(),
            version: Mutex::new(0),
            init_retry_attempts: config.init_retry_attempts.max(1),
            init_retry_interval: config.init_retry_interval,
        }
    }

    /// 메트릭 `updater` 레이블과 로그에 쓰이는 이름
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn parser(&self) -> &RuleParser {
        self.resolver.parser()
    }

    /// 현재 게시된 스냅샷 (락 없음)
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// 첫 스냅샷이 게시될 때까지 재시도합니다.
    ///
    /// # Errors
    /// 모든 시도가 실패하면 `NotReady`
    pub async fn init(&self) -> Result<Arc<Snapshot>, RuleEngineError> {
        let mut last_error = String::new();
        for attempt in 1..=self.init_retry_attempts {
            match self.reload(&[]).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    tracing::warn!(
                        updater = %self.name,
                        attempt,
                        max_attempts = self.init_retry_attempts,
                        error = %e,
                        "initial snapshot load failed"
                    );
                    last_error = e.to_string();
                    if attempt < self.init_retry_attempts {
                        tokio::time::sleep(self.init_retry_interval).await;
                    }
                }
            }
        }
        Err(RuleEngineError::NotReady(format!(
            "{}: no snapshot after {} attempts: {last_error}",
            self.name, self.init_retry_attempts
        )))
    }

    /// 정의가 추가/변경된 뒤 리로드합니다.
    pub async fn reload_for_update(&self, ids: &[String]) -> Result<Arc<Snapshot>, RuleEngineError> {
        tracing::debug!(updater = %self.name, ids = ?ids, "reloading for update");
        self.reload(&[]).await
    }

    /// 정의가 삭제된 뒤 리로드합니다. 삭제된 ID의 계측기도 정리합니다.
    pub async fn reload_for_delete(&self, ids: &[String]) -> Result<Arc<Snapshot>, RuleEngineError> {
        tracing::debug!(updater = %self.name, ids = ?ids, "reloading for delete");
        self.reload(ids).await
    }

    async fn reload(&self, deleted: &[String]) -> Result<Arc<Snapshot>, RuleEngineError> {
        let mut version = self.version.lock().await;

        let result = match self.source.load().await {
            Ok(definitions) => self.resolver.resolve(&definitions, *version + 1),
            Err(e) => Err(e),
        };
        let snapshot = match result {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                metrics::counter!(
                    names::STATE_RELOADS_TOTAL,
                    names::LABEL_RESULT => "failure",
                    names::LABEL_UPDATER => self.name.clone()
                )
                .increment(1);
                tracing::warn!(
                    updater = %self.name,
                    version = *version,
                    error = %e,
                    "reload failed, keeping previous snapshot"
                );
                return Err(if matches!(e, RuleEngineError::Reload(_)) {
                    e
                } else {
                    RuleEngineError::Reload(e.to_string())
                });
            }
        };

        let previous = self.current.swap(Some(Arc::clone(&snapshot)));
        *version = snapshot.version();

        // 교체 이후에만 정리
        let removed = self.cleanup_metrics(previous.as_deref(), &snapshot, deleted);

        metrics::counter!(
            names::STATE_RELOADS_TOTAL,
            names::LABEL_RESULT => "success",
            names::LABEL_UPDATER => self.name.clone()
        )
        .increment(1);
        metrics::gauge!(names::STATE_SNAPSHOT_VERSION, names::LABEL_UPDATER => self.name.clone())
            .set(snapshot.version() as f64);

        if snapshot.has_errors() {
            tracing::warn!(
                updater = %self.name,
                version = snapshot.version(),
                parse_errors = snapshot.source_errors().len(),
                resolution_errors = snapshot.resolution_errors().len(),
                "published degraded snapshot"
            );
        } else {
            tracing::info!(
                updater = %self.name,
                version = snapshot.version(),
                pipelines = snapshot.pipelines().len(),
                rules = snapshot.rules().len(),
                removed_instruments = removed,
                "published snapshot"
            );
        }
        Ok(snapshot)
    }

    /// 이전 스냅샷에만 있던 ID와 명시적으로 삭제된 ID의 계측기를 제거합니다.
    fn cleanup_metrics(&self, previous: Option<&Snapshot>, current: &Snapshot, deleted: &[String]) -> usize {
        let mut pipelines: BTreeSet<&str> = BTreeSet::new();
        let mut rules: BTreeSet<&str> = BTreeSet::new();
        if let Some(previous) = previous {
            pipelines.extend(
                previous
                    .pipelines()
                    .keys()
                    .filter(|id| current.pipeline(id).is_none())
                    .map(String::as_str),
            );
            rules.extend(
                previous
                    .rules()
                    .keys()
                    .filter(|id| current.rule(id).is_none())
                    .map(String::as_str),
            );
        }
        for id in deleted {
            if current.pipeline(id).is_none() {
                pipelines.insert(id.as_str());
            }
            if current.rule(id).is_none() {
                rules.insert(id.as_str());
            }
        }

        let mut removed = 0;
        for id in pipelines {
            removed += self.metrics.remove_matching(&names::pipeline_prefix(id));
        }
        for id in rules {
            removed += self.metrics.remove_matching(&names::rule_prefix(id));
        }
        removed
    }
}

impl<S: DefinitionSource> ConfigurationStateUpdater<S> {
    /// 리로드 이벤트를 순서대로 처리하는 태스크를 시작합니다.
    ///
    /// 채널이 닫히거나 `cancel`이 취소되면 종료합니다.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<ReloadEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(updater = %self.name, "reload listener cancelled");
                        break;
                    }
                    event = rx.recv() => {
                        let Some(event) = event else {
                            tracing::debug!(updater = %self.name, "reload channel closed");
                            break;
                        };
                        let result = match &event {
                            ReloadEvent::Update(ids) => self.reload_for_update(ids).await,
                            ReloadEvent::Delete(ids) => self.reload_for_delete(ids).await,
                        };
                        if let Err(e) = result {
                            tracing::debug!(updater = %self.name, event = ?event, error = %e, "reload event failed");
                        }
                    }
                }
            }
        })
    }
}

impl<S: DefinitionSource> SnapshotProvider for ConfigurationStateUpdater<S> {
    fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }
}

impl<S: DefinitionSource> SnapshotProvider for Arc<ConfigurationStateUpdater<S>> {
    fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }
}
