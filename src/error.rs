// error.rs - Error taxonomy for the blocking / jackknife analysis core

use thiserror::Error;

/// Errors raised by the analysis core and its I/O collaborators.
///
/// The first four variants are deterministic, input-dependent conditions of
/// the numerical core. They are surfaced to the immediate caller and never
/// retried or clamped.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Block size, locality, replica count or log-scale data out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Moment series passed together have different lengths.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// Nonlinear least squares did not converge or produced a singular covariance.
    #[error("fit failure: {0}")]
    FitFailure(String),
    /// The derivative spline has no root in the sampled range.
    #[error("root not found: {0}")]
    RootNotFound(String),
    /// Malformed content in a binary or CSV input.
    #[error("format error: {0}")]
    Format(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl AnalysisError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AnalysisError::InvalidParameter(msg.into())
    }

    pub(crate) fn mismatch(msg: impl Into<String>) -> Self {
        AnalysisError::DimensionMismatch(msg.into())
    }

    pub(crate) fn fit(msg: impl Into<String>) -> Self {
        AnalysisError::FitFailure(msg.into())
    }

    /// True for the core taxonomy (as opposed to I/O and parsing failures).
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidParameter(_)
                | AnalysisError::DimensionMismatch(_)
                | AnalysisError::FitFailure(_)
                | AnalysisError::RootNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
