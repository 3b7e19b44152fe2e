use std::path::PathBuf;

/// Problems with caller-supplied rows or configuration. Raised before any computation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("input is missing required column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("row {row}: missing value for '{column}'")]
    MissingField { row: usize, column: &'static str },

    #[error("row {row}: '{column}' value '{value}' is not a valid {expected}")]
    Malformed {
        row: usize,
        column: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("row {row}: '{column}' must be finite")]
    NonFinite { row: usize, column: &'static str },

    #[error("row {row}: spend must be >= 0, got {value}")]
    NegativeSpend { row: usize, value: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("could not read input: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("mean usage is not finite; usage values are too large to average")]
    NonFiniteMeanUsage,

    #[error("{quantity} overflowed; spend values are too large to total")]
    NonFiniteAggregate { quantity: &'static str },

    #[error("record {index} ('{name}') has a projection too large to represent")]
    NonFiniteProjection { index: usize, name: String },

    #[error(
        "coverage is unsatisfiable: shortfall of {shortfall} on lost revenue of {lost_revenue} but no active spend to redistribute over"
    )]
    UnsatisfiableCoverage { shortfall: f64, lost_revenue: f64 },

    #[error("record {index} ('{name}') has no growth estimate; run the estimator first")]
    NotEstimated { index: usize, name: String },
}

impl EngineError {
    /// Arithmetic on the inputs is undefined, as opposed to the inputs being malformed.
    pub fn is_degenerate_input(&self) -> bool {
        matches!(
            self,
            EngineError::NonFiniteMeanUsage
                | EngineError::NonFiniteAggregate { .. }
                | EngineError::NonFiniteProjection { .. }
                | EngineError::UnsatisfiableCoverage { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write export to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode export: {0}")]
    Csv(#[from] csv::Error),

    #[error("export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Errors surfaced by a command-line run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ValidationError> for RunError {
    fn from(err: ValidationError) -> Self {
        RunError::Engine(err.into())
    }
}
