//! 디렉토리 정의 저장소 -- 규칙/파이프라인 소스 파일을 디스크에서 로드합니다.
//!
//! ```text
//! <root>/
//!   rules/*.rule            규칙 하나씩, 파일 이름(확장자 제외)이 ID
//!   pipelines/*.pipeline    파이프라인 하나씩, 파일 이름이 ID
//!   connections.toml        [[connection]] stream = "..", pipelines = [..]
//! ```
//!
//! 개별 파일 로딩 실패는 경고 로그를 남기고 건너뜁니다.
//! 파싱은 해석 단계에서 하므로, 문법 에러가 있는 파일도 여기서는 그대로 전달됩니다.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RuleEngineError;
use crate::resolver::{Definitions, PipelineSource, RuleSource};

use super::DefinitionSource;

const MAX_SOURCE_FILE_SIZE: u64 = 1024 * 1024; // 1MB
const MAX_SOURCE_FILES: usize = 10_000;

const RULES_DIR: &str = "rules";
const PIPELINES_DIR: &str = "pipelines";
const CONNECTIONS_FILE: &str = "connections.toml";

#[derive(Debug, Default, Deserialize)]
struct ConnectionsFile {
    #[serde(default, rename = "connection")]
    connections: Vec<Connection>,
}

#[derive(Debug, Deserialize)]
struct Connection {
    stream: String,
    #[serde(default)]
    pipelines: BTreeSet<String>,
}

/// 디렉토리 기반 정의 저장소
#[derive(Debug, Clone)]
pub struct DirectoryDefinitionSource {
    root: PathBuf,
}

impl DirectoryDefinitionSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 디렉토리 전체를 읽습니다.
    ///
    /// # Errors
    /// - 루트 디렉토리를 읽을 수 없는 경우
    /// - 소스 파일 수가 `MAX_SOURCE_FILES`를 초과하는 경우
    /// - `connections.toml`이 있지만 파싱할 수 없는 경우
    pub async fn load_directory(&self) -> Result<Definitions, RuleEngineError> {
        tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| RuleEngineError::Load {
                path: self.root.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let rules = Self::load_sources(&self.root.join(RULES_DIR), "rule").await?;
        let pipelines = Self::load_sources(&self.root.join(PIPELINES_DIR), "pipeline").await?;

        let mut definitions = Definitions {
            rules: rules
                .into_iter()
                .map(|(id, source)| RuleSource {
                    title: id.clone(),
                    id,
                    source,
                })
                .collect(),
            pipelines: pipelines
                .into_iter()
                .map(|(id, source)| PipelineSource {
                    title: id.clone(),
                    id,
                    source,
                })
                .collect(),
            ..Definitions::default()
        };

        let connections_path = self.root.join(CONNECTIONS_FILE);
        if tokio::fs::try_exists(&connections_path).await.unwrap_or(false) {
            let content = Self::read_limited(&connections_path).await?;
            let file = Self::parse_connections(&content, &connections_path.display().to_string())?;
            for connection in file.connections {
                for pipeline in connection.pipelines {
                    definitions.connect(connection.stream.clone(), pipeline);
                }
            }
        }

        tracing::info!(
            dir = %self.root.display(),
            rules = definitions.rules.len(),
            pipelines = definitions.pipelines.len(),
            streams = definitions.connections.len(),
            "loaded pipeline definitions"
        );
        Ok(definitions)
    }

    /// `dir` 안의 `*.{extension}` 파일을 (ID, 내용)으로 읽습니다. 디렉토리가 없으면 빈 목록.
    async fn load_sources(dir: &Path, extension: &str) -> Result<Vec<(String, String)>, RuleEngineError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RuleEngineError::Load {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory: {e}"),
                });
            }
        };

        let mut sources = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| RuleEngineError::Load {
            path: dir.display().to_string(),
            reason: format!("failed to read directory entry: {e}"),
        })? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == extension) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
                tracing::warn!(path = %path.display(), "file name is not valid UTF-8, skipping");
                continue;
            };

            match Self::read_limited(&path).await {
                Ok(content) => sources.push((id, content)),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load source file, skipping"
                    );
                }
            }

            if sources.len() > MAX_SOURCE_FILES {
                return Err(RuleEngineError::Load {
                    path: dir.display().to_string(),
                    reason: format!("too many source files: max {MAX_SOURCE_FILES}"),
                });
            }
        }

        // 디렉토리 순회 순서는 플랫폼마다 다름
        sources.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(sources)
    }

    async fn read_limited(path: &Path) -> Result<String, RuleEngineError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| RuleEngineError::Load {
                path: path.display().to_string(),
                reason: format!("failed to read file metadata: {e}"),
            })?;

        if metadata.len() > MAX_SOURCE_FILE_SIZE {
            return Err(RuleEngineError::Load {
                path: path.display().to_string(),
                reason: format!(
                    "file too large: {} bytes (max: {MAX_SOURCE_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RuleEngineError::Load {
                path: path.display().to_string(),
                reason: format!("failed to read file: {e}"),
            })
    }

    fn parse_connections(content: &str, source: &str) -> Result<ConnectionsFile, RuleEngineError> {
        let file: ConnectionsFile = toml::from_str(content).map_err(|e| RuleEngineError::Load {
            path: source.to_owned(),
            reason: format!("TOML parse error: {e}"),
        })?;

        if let Some(blank) = file.connections.iter().find(|c| c.stream.trim().is_empty()) {
            return Err(RuleEngineError::Load {
                path: source.to_owned(),
                reason: format!("connection with empty stream id: {:?}", blank.pipelines),
            });
        }
        Ok(file)
    }
}

impl DefinitionSource for DirectoryDefinitionSource {
    async fn load(&self) -> Result<Definitions, RuleEngineError> {
        self.load_directory().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn loads_rules_pipelines_and_connections() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "rules/b.rule", r#"rule "b" when true then end"#);
        write(dir.path(), "rules/a.rule", r#"rule "a" when true then end"#);
        write(dir.path(), "rules/notes.txt", "ignored");
        write(
            dir.path(),
            "pipelines/main.pipeline",
            r#"pipeline "main" stage 0 match all rule "a"; end"#,
        );
        write(
            dir.path(),
            "connections.toml",
            r#"
[[connection]]
stream = "000000000000000000000001"
pipelines = ["main"]
"#,
        );

        let defs = DirectoryDefinitionSource::new(dir.path()).load().await.unwrap();
        let ids: Vec<&str> = defs.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(defs.pipelines[0].id, "main");
        assert!(defs.connections["000000000000000000000001"].contains("main"));
    }

    #[tokio::test]
    async fn missing_subdirectories_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let defs = DirectoryDefinitionSource::new(dir.path()).load().await.unwrap();
        assert!(defs.is_empty());
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let result = DirectoryDefinitionSource::new("/nonexistent/pipewright/rules").load().await;
        assert!(matches!(result, Err(RuleEngineError::Load { .. })));
    }

    #[test]
    fn blank_stream_in_connections_is_rejected() {
        let toml = r#"
[[connection]]
stream = " "
pipelines = ["p"]
"#;
        assert!(DirectoryDefinitionSource::parse_connections(toml, "connections.toml").is_err());
    }

    #[test]
    fn invalid_connections_toml_is_rejected() {
        assert!(DirectoryDefinitionSource::parse_connections("[[connection]", "c.toml").is_err());
    }
}
