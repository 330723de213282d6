use thiserror::Error;

/// The CSV could not be turned into records at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(
        "CSV must have columns for questions and answers (found header {header:?}); \
         name them e.g. \"question\" and \"answer\""
    )]
    MissingColumns { header: Vec<String> },
}

/// A replay run was rejected before any record was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("invalid replay input: {0}")]
    InvalidInput(&'static str),
}

/// A single chat call failed. Recovered per record by the replay driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("failed to reach Ollama: {0}")]
    Transport(String),
    #[error("Ollama returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode Ollama response: {0}")]
    Decode(String),
}
