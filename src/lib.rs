pub mod chat;
pub mod config;
pub mod constants;
pub mod error;
pub mod ollama;
pub mod records;
pub mod replay;
pub mod web_server;

pub use config::Settings;
pub use error::{ChatError, ParseError, RunError};
pub use ollama::{ChatClient, ChatMessage, OllamaClient, Role};
pub use records::{parse, FieldSplitting, QaRecord, RecordParser};
pub use replay::{
    CancelToken, ProgressSink, RecordOutcome, Reply, ReplayConfig, ReplayDriver, ReplayEvent,
    RunSummary,
};
