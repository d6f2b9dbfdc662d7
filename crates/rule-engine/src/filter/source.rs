//! 스트림 목적지 필터 저장소와 합성 규칙 생성

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::RuleEngineError;
use crate::resolver::{Definitions, PipelineSource, RuleSource};
use crate::state::DefinitionSource;

const MAX_FILTER_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const MAX_FILTERS_COUNT: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStatus {
    #[default]
    Enabled,
    Disabled,
}

/// 스트림 목적지 필터
///
/// `condition`이 참인 메시지는 `stream_id` 스트림의 `destination_type` 목적지로 가지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDestinationFilter {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub stream_id: String,
    pub destination_type: String,
    /// 규칙 조건 소스
    pub condition: String,
    #[serde(default)]
    pub status: FilterStatus,
}

impl StreamDestinationFilter {
    pub fn is_enabled(&self) -> bool {
        self.status == FilterStatus::Enabled
    }

    pub fn validate(&self) -> Result<(), RuleEngineError> {
        for (field, value) in [
            ("id", &self.id),
            ("stream_id", &self.stream_id),
            ("destination_type", &self.destination_type),
            ("condition", &self.condition),
        ] {
            if value.trim().is_empty() {
                return Err(RuleEngineError::Config {
                    field: format!("filter.{field}"),
                    reason: format!("must not be empty (filter '{}')", self.id),
                });
            }
        }
        Ok(())
    }
}

/// 필터 저장소
pub trait FilterSource: Send + Sync + 'static {
    /// 활성화된 필터 전체
    fn enabled_filters(
        &self,
    ) -> impl Future<Output = Result<Vec<StreamDestinationFilter>, RuleEngineError>> + Send;
}

/// 메모리 필터 저장소
#[derive(Debug, Default)]
pub struct InMemoryFilterSource {
    filters: RwLock<Vec<StreamDestinationFilter>>,
}

impl InMemoryFilterSource {
    pub fn new(filters: Vec<StreamDestinationFilter>) -> Self {
        Self {
            filters: RwLock::new(filters),
        }
    }

    /// 같은 ID의 필터가 있으면 교체합니다.
    pub fn upsert(&self, filter: StreamDestinationFilter) {
        if let Ok(mut filters) = self.filters.write() {
            match filters.iter_mut().find(|f| f.id == filter.id) {
                Some(existing) => *existing = filter,
                None => filters.push(filter),
            }
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let Ok(mut filters) = self.filters.write() else {
            return false;
        };
        let before = filters.len();
        filters.retain(|f| f.id != id);
        before != filters.len()
    }
}

impl FilterSource for InMemoryFilterSource {
    async fn enabled_filters(&self) -> Result<Vec<StreamDestinationFilter>, RuleEngineError> {
        let filters = self.filters.read().map_err(|_| RuleEngineError::Load {
            path: "memory".to_owned(),
            reason: "filter lock poisoned".to_owned(),
        })?;
        Ok(filters.iter().filter(|f| f.is_enabled()).cloned().collect())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FilterFile {
    #[serde(default, rename = "filter")]
    filters: Vec<StreamDestinationFilter>,
}

/// TOML 파일 필터 저장소
///
/// ```toml
/// [[filter]]
/// id = "drop-debug"
/// stream_id = "000000000000000000000001"
/// destination_type = "indexer"
/// condition = 'to_string($message.level) == "debug"'
/// ```
///
/// 잘못된 필터는 경고 로그를 남기고 건너뜁니다.
#[derive(Debug, Clone)]
pub struct TomlFilterSource {
    path: PathBuf,
}

impl TomlFilterSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// TOML 문자열에서 필터를 읽습니다. 비활성 필터도 포함됩니다.
    pub fn parse(content: &str, source: &str) -> Result<Vec<StreamDestinationFilter>, RuleEngineError> {
        let file: FilterFile = toml::from_str(content).map_err(|e| RuleEngineError::Load {
            path: source.to_owned(),
            reason: format!("TOML parse error: {e}"),
        })?;

        if file.filters.len() > MAX_FILTERS_COUNT {
            return Err(RuleEngineError::Load {
                path: source.to_owned(),
                reason: format!("too many filters: max {MAX_FILTERS_COUNT}"),
            });
        }

        let mut seen = HashSet::new();
        let mut filters = Vec::with_capacity(file.filters.len());
        for filter in file.filters {
            if let Err(e) = filter.validate() {
                tracing::warn!(filter_id = %filter.id, source, error = %e, "invalid filter, skipping");
                continue;
            }
            if !seen.insert(filter.id.clone()) {
                tracing::warn!(filter_id = %filter.id, source, "duplicate filter id, skipping");
                continue;
            }
            filters.push(filter);
        }
        Ok(filters)
    }
}

impl FilterSource for TomlFilterSource {
    async fn enabled_filters(&self) -> Result<Vec<StreamDestinationFilter>, RuleEngineError> {
        let path = self.path.display().to_string();
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| RuleEngineError::Load {
                path: path.clone(),
                reason: format!("failed to read file metadata: {e}"),
            })?;
        if metadata.len() > MAX_FILTER_FILE_SIZE {
            return Err(RuleEngineError::Load {
                path,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_FILTER_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RuleEngineError::Load {
                path: path.clone(),
                reason: format!("failed to read file: {e}"),
            })?;

        let mut filters = Self::parse(&content, &path)?;
        filters.retain(StreamDestinationFilter::is_enabled);
        Ok(filters)
    }
}

/// 필터를 합성 규칙/파이프라인 정의로 바꾸는 어댑터
///
/// - 필터 하나 → 규칙 하나 (규칙 ID와 이름은 필터 ID)
/// - 스트림 하나 → 파이프라인 하나 (파이프라인 ID와 이름은 스트림 ID), 그 스트림에 연결
#[derive(Debug)]
pub struct FilterDefinitionSource<F> {
    filters: F,
}

impl<F: FilterSource> FilterDefinitionSource<F> {
    pub fn new(filters: F) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &F {
        &self.filters
    }

    /// 필터 목록을 정의로 변환합니다.
    pub fn definitions(filters: &[StreamDestinationFilter]) -> Definitions {
        let mut definitions = Definitions::default();
        let mut by_stream: BTreeMap<&str, Vec<&StreamDestinationFilter>> = BTreeMap::new();

        for filter in filters {
            definitions.rules.push(RuleSource {
                id: filter.id.clone(),
                title: if filter.title.is_empty() {
                    filter.id.clone()
                } else {
                    filter.title.clone()
                },
                source: rule_source(filter),
            });
            by_stream.entry(filter.stream_id.as_str()).or_default().push(filter);
        }

        for (stream_id, filters) in by_stream {
            let mut source = format!("pipeline {}\nstage 0 match either\n", quote(stream_id));
            for filter in filters {
                source.push_str(&format!("rule {};\n", quote(&filter.id)));
            }
            source.push_str("end");
            definitions.pipelines.push(PipelineSource {
                id: stream_id.to_owned(),
                title: stream_id.to_owned(),
                source,
            });
            definitions.connect(stream_id, stream_id);
        }
        definitions
    }
}

impl<F: FilterSource> DefinitionSource for FilterDefinitionSource<F> {
    async fn load(&self) -> Result<Definitions, RuleEngineError> {
        let filters = self.filters.enabled_filters().await?;
        Ok(Self::definitions(&filters))
    }
}

fn rule_source(filter: &StreamDestinationFilter) -> String {
    format!(
        "rule {}\nwhen\n{}\nthen\nremove_from_stream_destination(stream_id: {}, destination_type: {});\nend",
        quote(&filter.id),
        filter.condition,
        quote(&filter.stream_id),
        quote(&filter.destination_type),
    )
}

/// 규칙 언어 문자열 리터럴
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
