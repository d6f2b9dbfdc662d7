#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`parser`]: 렉서, 파서, 타입 검사
//! - [`functions`]: 함수 레지스트리와 내장 함수
//! - [`resolver`]: 정의 → 불변 스냅샷
//! - [`interpreter`]: 스테이지 실행, 스트림 라우팅, 리스너
//! - [`state`]: 정의 저장소와 핫 리로드
//! - [`filter`]: 스트림 목적지 출력 필터
//! - [`metrics`]: 동적 계측기 레지스트리
//!
//! # 아키텍처
//!
//! ```text
//! DefinitionSource -> RuleParser -> PipelineResolver -> Snapshot (ArcSwap)
//!                                                           |
//!                         Message -> Interpreter ----------+-> Message(s)
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod filter;
pub mod functions;
pub mod interpreter;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod state;
pub mod types;

// --- 주요 타입 re-export ---

// 설정 / 에러
pub use config::{EngineConfig, EngineConfigBuilder, StageMissBehavior};
pub use error::RuleEngineError;

// 파서
pub use parser::{ParseError, ParseErrorKind, ParseErrors, RuleParser};

// 함수
pub use functions::{
    Function, FunctionDescriptor, FunctionError, FunctionRegistry, InMemoryLookupTables,
    LookupTables, ParameterDescriptor,
};

// 해석 / 실행
pub use interpreter::{
    EvalError, EvaluationContext, Interpreter, InterpreterListener, NoopInterpreterListener,
    RuleMetricsListener, TraceListener,
};
pub use pipeline::{Pipeline, Stage};
pub use resolver::{Definitions, PipelineResolver, PipelineSource, RuleSource, Snapshot};

// 상태
pub use state::{
    ConfigurationStateUpdater, DefinitionSource, DirectoryDefinitionSource,
    InMemoryDefinitionSource, ReloadEvent, SnapshotProvider,
};

// 출력 필터
pub use filter::{FilteredMessage, PipelineRuleOutputFilter, StreamDestinationFilter};

// 메트릭
pub use crate::metrics::{InMemoryMetricRegistry, MetricRegistry, RecorderMetricRegistry};
