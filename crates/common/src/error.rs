use thiserror::Error;

/// Canonical skiff error taxonomy used across crates.
///
/// Classification guidance:
/// - [`SkiffError::Schema`]: column/dtype/shape contract violations on frames and series
/// - [`SkiffError::Planning`]: plan shape problems (bad group keys, join key arity, bad aggregation)
/// - [`SkiffError::Execution`]: runtime operator failures, including errors captured from workers
/// - [`SkiffError::InvalidConfig`]: parallel/engine configuration values out of range
/// - [`SkiffError::Unsupported`]: valid requests the engine intentionally does not evaluate
/// - [`SkiffError::Io`]: raw IO failures forwarded from format collaborators
/// - [`SkiffError::Arrow`]: failures surfaced by arrow compute kernels
#[derive(Debug, Error)]
pub enum SkiffError {
    /// Invalid or inconsistent configuration.
    ///
    /// Examples:
    /// - `morsel_size == 0`
    /// - malformed JSON engine config
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Frame/series contract violations.
    ///
    /// Examples:
    /// - missing column
    /// - duplicate column name in a frame
    /// - series length mismatch on frame construction
    /// - dtype that an operation cannot accept
    #[error("schema error: {0}")]
    Schema(String),

    /// Plan-shape failures discovered while planning or dispatching a node.
    ///
    /// Examples:
    /// - group-by key that is not a column reference
    /// - `left_on`/`right_on` of different length
    /// - aggregation on nonexistent column
    #[error("planning error: {0}")]
    Planning(String),

    /// Runtime execution failures after planning succeeded.
    #[error("execution error: {0}")]
    Execution(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors raised by arrow compute kernels.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Valid request for a feature not implemented in the in-memory engine.
    ///
    /// Examples:
    /// - struct field / list element access (no nested dtypes)
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard skiff result alias.
pub type Result<T> = std::result::Result<T, SkiffError>;
