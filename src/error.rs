// Error taxonomy shared by the factorization engines and the dispatch layer.

use std::error::Error;
use std::fmt;

/// Errors surfaced by factorizations, solves, and dispatch entry points.
///
/// Backend-resolution failures are intentionally absent: a candidate backend
/// that cannot be loaded (or declines an operation at run time) is swallowed
/// by the dispatch layer, which simply moves on to the next candidate or the
/// built-in engine. Only shape and singularity problems ever reach a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorError {
    /// An operation was invoked on incompatible dimensions, e.g. inverting a
    /// non-square matrix, QR on a matrix with fewer rows than columns, or a
    /// solve with mismatched row counts.
    Shape(String),
    /// The matrix does not admit the requested solve: a zero U-diagonal entry
    /// during LU, a rank-deficient R during least-squares QR, or a
    /// non-positive-definite input to a symmetric solve.
    ///
    /// Distinct from [`FactorError::Shape`] so callers can fall back to a
    /// generalized-inverse-based solve when they choose to.
    Singular(String),
}

impl fmt::Display for FactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorError::Shape(msg) => write!(f, "shape mismatch: {}", msg),
            FactorError::Singular(msg) => write!(f, "singular matrix: {}", msg),
        }
    }
}

impl Error for FactorError {}

impl FactorError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        FactorError::Shape(msg.into())
    }

    pub(crate) fn singular(msg: impl Into<String>) -> Self {
        FactorError::Singular(msg.into())
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn display_distinguishes_variants() {
        let shape = FactorError::shape("expected 3x3, got 3x4");
        let singular = FactorError::singular("zero diagonal in U at 2");
        assert!(shape.to_string().contains("shape mismatch"));
        assert!(singular.to_string().contains("singular matrix"));
        assert_ne!(shape, singular);
    }
}
