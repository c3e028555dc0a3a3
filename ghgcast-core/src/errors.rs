use thiserror::Error;

/// Error type for scenario computation failures.
///
/// All variants are fatal: a forecast is computed fully or not at all.
/// Programming errors (accessing an undeclared dependency from a calc body)
/// panic instead of surfacing here.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("{0}")]
    Error(String),
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("Wrong type for variable '{name}'. Expected {expected}, got {got}")]
    VariableTypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("Dataset '{0}' could not be loaded")]
    DatasetMissing(String),
    #[error("Source data violates a precondition: {0}")]
    DataPrecondition(String),
    #[error("Target production ratios must sum to 100, got {0}")]
    ProductionRatioSum(f64),
    #[error("{what} fit did not converge (residual {residual:e})")]
    FitNonConvergence { what: String, residual: f64 },
}

/// Convenience type for `Result<T, ScenarioError>`.
pub type ScenarioResult<T> = Result<T, ScenarioError>;
