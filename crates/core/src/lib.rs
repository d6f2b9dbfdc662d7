#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod value;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, EngineError, MessageError, PipewrightError, StorageError};

// 설정
pub use config::PipewrightConfig;

// 메시지
pub use message::{DEFAULT_STREAM_ID, Message, ProcessingError};

// 값
pub use value::{MessageHandle, Period, Value};
