//! 메모리 정의 저장소

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::RuleEngineError;
use crate::resolver::{Definitions, PipelineSource, RuleSource};

use super::DefinitionSource;

/// 메모리에 정의를 보관하는 저장소
///
/// 정의를 바꾼 뒤 갱신기의 `reload_for_update`/`reload_for_delete`를 호출하면 반영됩니다.
/// `set_available(false)`로 저장소 장애를 흉내낼 수 있습니다.
#[derive(Debug)]
pub struct InMemoryDefinitionSource {
    definitions: RwLock<Definitions>,
    available: AtomicBool,
}

impl Default for InMemoryDefinitionSource {
    fn default() -> Self {
        Self::new(Definitions::default())
    }
}

impl InMemoryDefinitionSource {
    pub fn new(definitions: Definitions) -> Self {
        Self {
            definitions: RwLock::new(definitions),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn replace(&self, definitions: Definitions) {
        if let Ok(mut current) = self.definitions.write() {
            *current = definitions;
        }
    }

    /// 같은 ID의 규칙이 있으면 교체합니다.
    pub fn upsert_rule(&self, rule: RuleSource) {
        if let Ok(mut current) = self.definitions.write() {
            match current.rules.iter_mut().find(|r| r.id == rule.id) {
                Some(existing) => *existing = rule,
                None => current.rules.push(rule),
            }
        }
    }

    /// 같은 ID의 파이프라인이 있으면 교체합니다.
    pub fn upsert_pipeline(&self, pipeline: PipelineSource) {
        if let Ok(mut current) = self.definitions.write() {
            match current.pipelines.iter_mut().find(|p| p.id == pipeline.id) {
                Some(existing) => *existing = pipeline,
                None => current.pipelines.push(pipeline),
            }
        }
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        let Ok(mut current) = self.definitions.write() else {
            return false;
        };
        let before = current.rules.len();
        current.rules.retain(|r| r.id != id);
        before != current.rules.len()
    }

    /// 파이프라인과 그 스트림 연결을 제거합니다.
    pub fn remove_pipeline(&self, id: &str) -> bool {
        let Ok(mut current) = self.definitions.write() else {
            return false;
        };
        let before = current.pipelines.len();
        current.pipelines.retain(|p| p.id != id);
        for pipelines in current.connections.values_mut() {
            pipelines.remove(id);
        }
        current.connections.retain(|_, pipelines| !pipelines.is_empty());
        before != current.pipelines.len()
    }

    pub fn connect(&self, stream_id: &str, pipeline_id: &str) {
        if let Ok(mut current) = self.definitions.write() {
            current.connect(stream_id, pipeline_id);
        }
    }

    pub fn definitions(&self) -> Definitions {
        self.definitions
            .read()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl DefinitionSource for InMemoryDefinitionSource {
    async fn load(&self) -> Result<Definitions, RuleEngineError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(RuleEngineError::Load {
                path: "memory".to_owned(),
                reason: "definition source unavailable".to_owned(),
            });
        }
        self.definitions
            .read()
            .map(|d| d.clone())
            .map_err(|_| RuleEngineError::Load {
                path: "memory".to_owned(),
                reason: "definition lock poisoned".to_owned(),
            })
    }
}
