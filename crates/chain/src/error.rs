use thiserror::Error;

/// Result type for unit sequence operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors raised while building or querying unit sequences
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// A document must hold at least one unit
    #[error("Document has no units")]
    EmptyDocument,

    /// Unit indices must form one ascending run without gaps
    #[error("Non-contiguous unit index: expected {expected}, found {found}")]
    NonContiguous { expected: usize, found: usize },

    /// Index outside the document
    #[error("Unit not found: {0}")]
    UnitNotFound(usize),

    /// Pooling needs an embedding on every member
    #[error("Unit {0} has no embedding vector")]
    MissingVector(usize),

    /// Vectors of different sizes cannot be pooled
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// One cluster label is required per unit
    #[error("Label count mismatch: expected {expected}, got {actual}")]
    LabelCountMismatch { expected: usize, actual: usize },

    /// A unit cluster needs at least one member
    #[error("Cluster has no units")]
    EmptyCluster,
}
