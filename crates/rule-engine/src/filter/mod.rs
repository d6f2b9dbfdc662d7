//! 파이프라인 규칙 기반 출력 필터
//!
//! 메시지가 어떤 목적지(예: `indexer`)의 어떤 스트림으로 나갈지 결정합니다.
//!
//! 1. 목적지 유형마다 메시지의 스트림 집합을 초기 목적지로 설정
//! 2. 목적지를 메타데이터(`pipewright.destinations`)에 기록
//! 3. 메시지 스트림에 연결된 필터 파이프라인 실행 (`remove_from_stream_destination`이 목적지를 줄임)
//! 4. 메타데이터에서 목적지를 읽고 키를 제거

mod function;
mod source;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use pipewright_core::message::Message;
use pipewright_core::metrics as names;
use pipewright_core::value::Value;

pub use source::{
    FilterDefinitionSource, FilterSource, FilterStatus, InMemoryFilterSource, StreamDestinationFilter,
    TomlFilterSource,
};

use crate::config::EngineConfig;
use crate::functions::FunctionRegistry;
use crate::interpreter::{Interpreter, NoopInterpreterListener};
use crate::metrics::MetricRegistry;
use crate::parser::RuleParser;
use crate::state::{ConfigurationStateUpdater, SnapshotProvider};

/// 목적지 메타데이터 키
pub const DESTINATIONS_METADATA_KEY: &str = "pipewright.destinations";

/// 색인 목적지 유형
pub const INDEXER_DESTINATION: &str = "indexer";

/// 출력 필터용 상태 갱신기
pub type OutputFilterUpdater<F> = ConfigurationStateUpdater<FilterDefinitionSource<F>>;

/// 내장 함수와 `remove_from_stream_destination`이 등록된 레지스트리
pub fn filter_function_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::with_builtins();
    registry.register(function::builtin());
    registry
}

/// 필터 결과
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredMessage {
    pub message: Message,
    /// 목적지 유형 → 스트림 ID
    pub destinations: BTreeMap<String, BTreeSet<String>>,
}

impl FilteredMessage {
    pub fn destination(&self, destination_type: &str) -> Option<&BTreeSet<String>> {
        self.destinations.get(destination_type)
    }

    /// `indexer` 목적지에 스트림이 하나라도 남아 있는지
    pub fn is_indexed(&self) -> bool {
        self.destination(INDEXER_DESTINATION)
            .is_some_and(|streams| !streams.is_empty())
    }
}

/// 출력 필터
pub struct PipelineRuleOutputFilter<P> {
    interpreter: Interpreter<P>,
    destination_types: Vec<String>,
}

/// 필터 저장소 위에 출력 필터용 갱신기를 만듭니다.
///
/// 반환된 갱신기의 `init()`을 호출해야 필터가 동작합니다.
pub fn output_filter_updater<F: FilterSource>(
    filters: F,
    metrics: Arc<dyn MetricRegistry>,
    config: &EngineConfig,
) -> Arc<OutputFilterUpdater<F>> {
    Arc::new(
        ConfigurationStateUpdater::new(
            FilterDefinitionSource::new(filters),
            RuleParser::new(Arc::new(filter_function_registry())),
            metrics,
            config,
        )
        .with_name("output_filter"),
    )
}

impl<P: SnapshotProvider> PipelineRuleOutputFilter<P> {
    pub fn new(provider: P, config: &EngineConfig) -> Self {
        Self {
            interpreter: Interpreter::with_config(provider, config),
            destination_types: config.destination_types.clone(),
        }
    }

    /// 메시지의 목적지를 계산합니다.
    pub fn apply(&self, mut message: Message) -> FilteredMessage {
        let streams = message.streams().clone();
        let initial: BTreeMap<String, Value> = self
            .destination_types
            .iter()
            .map(|ty| {
                (
                    ty.clone(),
                    Value::List(streams.iter().map(|s| Value::String(s.clone())).collect()),
                )
            })
            .collect();

        let Some(snapshot) = self.interpreter.provider().current() else {
            tracing::debug!(message_id = %message.id(), "no filter snapshot, passing message through");
            return FilteredMessage {
                message,
                destinations: self
                    .destination_types
                    .iter()
                    .map(|ty| (ty.clone(), streams.clone()))
                    .collect(),
            };
        };

        message.set_metadata(DESTINATIONS_METADATA_KEY, Value::Map(initial));

        let pipelines = snapshot.pipelines_for_streams(streams.iter().map(String::as_str));
        if !pipelines.is_empty() {
            let created = self.interpreter.process_for_resolved_pipelines(
                &mut message,
                &pipelines,
                &mut NoopInterpreterListener,
                &snapshot,
            );
            if !created.is_empty() {
                tracing::debug!(
                    message_id = %message.id(),
                    created = created.len(),
                    "output filter rules created messages, discarding"
                );
            }
            message.flush_processing_errors();
        }

        let destinations = match message.remove_metadata(DESTINATIONS_METADATA_KEY) {
            Some(Value::Map(map)) => map
                .into_iter()
                .map(|(ty, streams)| {
                    let streams = match streams {
                        Value::List(items) => items
                            .into_iter()
                            .filter_map(|s| match s {
                                Value::String(s) => Some(s),
                                _ => None,
                            })
                            .collect(),
                        _ => BTreeSet::new(),
                    };
                    (ty, streams)
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        metrics::counter!(names::OUTPUT_FILTER_MESSAGES_TOTAL).increment(1);
        FilteredMessage {
            message,
            destinations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetricRegistry;
    use crate::resolver::Snapshot;

    fn filter(id: &str, stream: &str, condition: &str) -> StreamDestinationFilter {
        StreamDestinationFilter {
            id: id.to_owned(),
            title: String::new(),
            stream_id: stream.to_owned(),
            destination_type: INDEXER_DESTINATION.to_owned(),
            condition: condition.to_owned(),
            status: FilterStatus::Enabled,
        }
    }

    fn message(level: &str, streams: &[&str]) -> Message {
        let mut message = Message::empty();
        message.add_field("level", Value::from(level));
        for stream in streams {
            message.add_stream(*stream);
        }
        message
    }

    #[tokio::test]
    async fn matching_filter_removes_stream_from_indexer() {
        let config = EngineConfig::default();
        let updater = output_filter_updater(
            InMemoryFilterSource::new(vec![filter("f1", "s1", r#"to_string($message.level) == "debug""#)]),
            Arc::new(InMemoryMetricRegistry::new()),
            &config,
        );
        updater.init().await.unwrap();
        let output = PipelineRuleOutputFilter::new(Arc::clone(&updater), &config);

        let filtered = output.apply(message("debug", &["s1", "s2"]));
        assert_eq!(
            filtered.destination(INDEXER_DESTINATION),
            Some(&BTreeSet::from(["s2".to_owned()]))
        );
        assert!(filtered.is_indexed());
        assert!(filtered.message.metadata(DESTINATIONS_METADATA_KEY).is_none());

        let filtered = output.apply(message("debug", &["s1"]));
        assert!(!filtered.is_indexed());

        let filtered = output.apply(message("info", &["s1"]));
        assert!(filtered.is_indexed());
    }

    #[test]
    fn without_snapshot_all_streams_pass() {
        let config = EngineConfig::default();
        let output = PipelineRuleOutputFilter::new(None::<Arc<Snapshot>>, &config);
        let filtered = output.apply(message("debug", &["s1"]));
        assert!(filtered.is_indexed());
    }
}
