//! 파이프라인 해석기 -- 규칙/파이프라인 정의를 실행 가능한 스냅샷으로 변환합니다.
//!
//! 1. 모든 규칙 소스를 파싱 (실패한 규칙은 에러만 기록)
//! 2. 모든 파이프라인 소스를 파싱
//! 3. 스테이지의 규칙 이름을 파싱된 규칙에 바인딩 (없으면 해석 에러 기록 후 제외)
//! 4. 스트림 연결을 파이프라인에 바인딩
//!
//! `strict_resolution`이 켜져 있으면 파싱/해석 에러가 하나라도 있을 때 해석 전체가 실패합니다.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::ast::Rule;
use crate::config::EngineConfig;
use crate::error::RuleEngineError;
use crate::interpreter::plan::StagePlan;
use crate::metrics::MetricRegistry;
use crate::parser::{ParseErrors, RuleParser};
use crate::pipeline::{Pipeline, RuleMetrics, Stage, StageRule};

/// 저장된 규칙 소스
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSource {
    pub id: String,
    pub title: String,
    pub source: String,
}

/// 저장된 파이프라인 소스
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSource {
    pub id: String,
    pub title: String,
    pub source: String,
}

/// 해석 입력: 규칙, 파이프라인, 스트림 연결 (스트림 ID → 파이프라인 ID)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub rules: Vec<RuleSource>,
    #[serde(default)]
    pub pipelines: Vec<PipelineSource>,
    #[serde(default)]
    pub connections: BTreeMap<String, BTreeSet<String>>,
}

impl Definitions {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.pipelines.is_empty()
    }

    /// 스트림을 파이프라인에 연결합니다.
    pub fn connect(&mut self, stream_id: impl Into<String>, pipeline_id: impl Into<String>) {
        self.connections
            .entry(stream_id.into())
            .or_default()
            .insert(pipeline_id.into());
    }
}

/// 파싱에 실패한 소스
#[derive(Debug, Clone, Serialize)]
pub struct SourceError {
    pub kind: SourceKind,
    pub id: String,
    pub title: String,
    pub errors: ParseErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rule,
    Pipeline,
}

/// 해석할 수 없는 참조
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionError {
    pub pipeline_id: String,
    /// 스테이지 번호 (스트림 연결 에러면 `None`)
    pub stage: Option<i32>,
    /// 해석하지 못한 규칙 이름 또는 스트림 ID
    pub reference: String,
    pub reason: String,
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(
                f,
                "pipeline '{}' stage {stage}: rule '{}' {}",
                self.pipeline_id, self.reference, self.reason
            ),
            None => write!(
                f,
                "stream '{}' -> pipeline '{}': {}",
                self.reference, self.pipeline_id, self.reason
            ),
        }
    }
}

/// 해석이 끝난 불변 스냅샷
///
/// 리로드마다 새로 만들어지며, 게시 후에는 스테이지 계획 캐시 외에 변하는 것이 없습니다.
pub struct Snapshot {
    version: u64,
    rules: BTreeMap<String, Arc<Rule>>,
    pipelines: BTreeMap<String, Arc<Pipeline>>,
    connections: BTreeMap<String, Vec<Arc<Pipeline>>>,
    source_errors: Vec<SourceError>,
    resolution_errors: Vec<ResolutionError>,
    plan_cache: Option<RwLock<HashMap<Vec<String>, Arc<StagePlan>>>>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn rules(&self) -> &BTreeMap<String, Arc<Rule>> {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&Arc<Rule>> {
        self.rules.get(id)
    }

    pub fn pipelines(&self) -> &BTreeMap<String, Arc<Pipeline>> {
        &self.pipelines
    }

    pub fn pipeline(&self, id: &str) -> Option<&Arc<Pipeline>> {
        self.pipelines.get(id)
    }

    /// 스트림에 연결된 파이프라인 (ID 순)
    pub fn connected(&self, stream_id: &str) -> &[Arc<Pipeline>] {
        self.connections
            .get(stream_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn stream_ids(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    /// 여러 스트림에 연결된 파이프라인의 합집합 (ID 순, 중복 제거)
    pub fn pipelines_for_streams<'a>(
        &self,
        streams: impl IntoIterator<Item = &'a str>,
    ) -> Vec<Arc<Pipeline>> {
        let mut selected: BTreeMap<&str, &Arc<Pipeline>> = BTreeMap::new();
        for stream in streams {
            for pipeline in self.connected(stream) {
                selected.insert(pipeline.id.as_str(), pipeline);
            }
        }
        selected.into_values().cloned().collect()
    }

    /// 파이프라인 조합의 스테이지 계획. 캐시가 켜져 있으면 재사용합니다.
    pub fn stage_plan(&self, pipelines: &[Arc<Pipeline>]) -> Arc<StagePlan> {
        let Some(cache) = &self.plan_cache else {
            return Arc::new(StagePlan::build(pipelines));
        };
        let key = StagePlan::cache_key(pipelines);
        if let Ok(plans) = cache.read()
            && let Some(plan) = plans.get(&key)
        {
            return Arc::clone(plan);
        }
        let plan = Arc::new(StagePlan::build(pipelines));
        if let Ok(mut plans) = cache.write() {
            plans.entry(key).or_insert_with(|| Arc::clone(&plan));
        }
        plan
    }

    pub fn source_errors(&self) -> &[SourceError] {
        &self.source_errors
    }

    pub fn resolution_errors(&self) -> &[ResolutionError] {
        &self.resolution_errors
    }

    pub fn has_errors(&self) -> bool {
        !self.source_errors.is_empty() || !self.resolution_errors.is_empty()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.version)
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .field("pipelines", &self.pipelines.keys().collect::<Vec<_>>())
            .field("source_errors", &self.source_errors.len())
            .field("resolution_errors", &self.resolution_errors.len())
            .finish()
    }
}

/// 정의 → 스냅샷 변환기
pub struct PipelineResolver {
    parser: RuleParser,
    metrics: Arc<dyn MetricRegistry>,
    strict: bool,
    cache_stage_plans: bool,
}

impl PipelineResolver {
    pub fn new(parser: RuleParser, metrics: Arc<dyn MetricRegistry>, config: &EngineConfig) -> Self {
        Self {
            parser,
            metrics,
            strict: config.strict_resolution,
            cache_stage_plans: config.cache_stage_plans,
        }
    }

    pub fn parser(&self) -> &RuleParser {
        &self.parser
    }

    /// 정의를 해석하여 `version` 스냅샷을 만듭니다.
    pub fn resolve(&self, definitions: &Definitions, version: u64) -> Result<Snapshot, RuleEngineError> {
        let mut source_errors = Vec::new();
        let mut resolution_errors = Vec::new();

        // 규칙 (이름으로 참조되므로 이름 → 규칙 맵도 구성)
        let mut rules: BTreeMap<String, Arc<Rule>> = BTreeMap::new();
        let mut rules_by_name: HashMap<String, Arc<Rule>> = HashMap::new();
        for source in &definitions.rules {
            match self.parser.parse_rule(&source.source) {
                Ok(rule) => {
                    let rule = Arc::new(rule.with_id(source.id.clone()));
                    if rules_by_name.contains_key(&rule.name) {
                        tracing::warn!(
                            rule_id = %source.id,
                            rule_name = %rule.name,
                            "duplicate rule name, keeping the first definition"
                        );
                    } else {
                        rules_by_name.insert(rule.name.clone(), Arc::clone(&rule));
                    }
                    rules.insert(source.id.clone(), rule);
                }
                Err(errors) => {
                    tracing::warn!(
                        rule_id = %source.id,
                        errors = errors.len(),
                        "rule failed to parse"
                    );
                    source_errors.push(SourceError {
                        kind: SourceKind::Rule,
                        id: source.id.clone(),
                        title: source.title.clone(),
                        errors,
                    });
                }
            }
        }

        // 파이프라인
        let mut pipelines: BTreeMap<String, Arc<Pipeline>> = BTreeMap::new();
        for source in &definitions.pipelines {
            let decl = match self.parser.parse_pipeline(&source.source) {
                Ok(decl) => decl.with_id(source.id.clone()),
                Err(errors) => {
                    tracing::warn!(
                        pipeline_id = %source.id,
                        errors = errors.len(),
                        "pipeline failed to parse"
                    );
                    source_errors.push(SourceError {
                        kind: SourceKind::Pipeline,
                        id: source.id.clone(),
                        title: source.title.clone(),
                        errors,
                    });
                    continue;
                }
            };

            let pipeline_id = decl.id().to_owned();
            let mut stages = Vec::with_capacity(decl.stages.len());
            for stage in &decl.stages {
                let mut stage_rules = Vec::with_capacity(stage.rule_names.len());
                for name in &stage.rule_names {
                    match rules_by_name.get(name) {
                        Some(rule) => stage_rules.push(StageRule {
                            rule: Arc::clone(rule),
                            metrics: RuleMetrics::register(
                                self.metrics.as_ref(),
                                rule.id(),
                                &pipeline_id,
                                stage.number,
                            ),
                        }),
                        None => {
                            let error = ResolutionError {
                                pipeline_id: pipeline_id.clone(),
                                stage: Some(stage.number),
                                reference: name.clone(),
                                reason: "does not exist or failed to parse".to_owned(),
                            };
                            tracing::warn!(error = %error, "excluding unresolved rule from stage");
                            resolution_errors.push(error);
                        }
                    }
                }
                stages.push(Stage {
                    number: stage.number,
                    match_policy: stage.match_policy,
                    rule_references: stage.rule_names.clone(),
                    rules: stage_rules,
                    executed: self.metrics.counter(&pipewright_core::metrics::stage_executed(
                        &pipeline_id,
                        stage.number,
                    )),
                });
            }
            stages.sort_by_key(|s| s.number);

            pipelines.insert(
                pipeline_id.clone(),
                Arc::new(Pipeline {
                    executed: self
                        .metrics
                        .counter(&pipewright_core::metrics::pipeline_executed(&pipeline_id)),
                    id: pipeline_id,
                    name: decl.name,
                    stages,
                }),
            );
        }

        // 스트림 연결
        let mut connections: BTreeMap<String, Vec<Arc<Pipeline>>> = BTreeMap::new();
        for (stream_id, pipeline_ids) in &definitions.connections {
            let connected = connections.entry(stream_id.clone()).or_default();
            for pipeline_id in pipeline_ids {
                match pipelines.get(pipeline_id) {
                    Some(pipeline) => connected.push(Arc::clone(pipeline)),
                    None => resolution_errors.push(ResolutionError {
                        pipeline_id: pipeline_id.clone(),
                        stage: None,
                        reference: stream_id.clone(),
                        reason: "connected pipeline does not exist or failed to parse".to_owned(),
                    }),
                }
            }
        }

        if self.strict {
            if let Some(error) = source_errors.into_iter().next() {
                return Err(RuleEngineError::Parse {
                    source_id: error.id,
                    errors: error.errors,
                });
            }
            if let Some(error) = resolution_errors.into_iter().next() {
                return Err(RuleEngineError::Resolution {
                    pipeline: error.pipeline_id.clone(),
                    reason: error.to_string(),
                });
            }
            source_errors = Vec::new();
            resolution_errors = Vec::new();
        }

        if !source_errors.is_empty() {
            metrics::counter!(pipewright_core::metrics::STATE_PARSE_ERRORS_TOTAL)
                .increment(source_errors.len() as u64);
        }
        if !resolution_errors.is_empty() {
            metrics::counter!(pipewright_core::metrics::STATE_RESOLUTION_ERRORS_TOTAL)
                .increment(resolution_errors.len() as u64);
        }

        Ok(Snapshot {
            version,
            rules,
            pipelines,
            connections,
            source_errors,
            resolution_errors,
            plan_cache: self.cache_stage_plans.then(|| RwLock::new(HashMap::new())),
        })
    }
}
