use thiserror::Error;

/// Recoverable errors at the boundaries of the core.
///
/// Infeasibility is not an error: it is reported through contradiction flags and state statuses.
/// Broken internal invariants panic.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported constraint: {0}")]
    UnsupportedConstraint(String),

    #[error("solver failure: {0}")]
    Solver(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
