use context_chain::ChainError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExpansionError>;

#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("Unit sequence error: {0}")]
    Chain(#[from] ChainError),

    #[error("Relevance oracle error: {0}")]
    Oracle(String),

    #[error("Relevance oracle returned {actual} scores for {expected} inputs")]
    OracleArity { expected: usize, actual: usize },

    #[error("State not found in history: {0}")]
    StateNotFound(usize),

    #[error("Cannot clear round {round}: it holds the selected state")]
    ClearSelectedRound { round: usize },

    #[error("Cluster belongs to document {expected}, got document {actual}")]
    DocumentMismatch { expected: u32, actual: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExpansionError {
    /// Create an oracle error
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }
}
