// Cholesky factorization of symmetric positive-definite matrices.

use log::trace;
use ndarray::Array2;

use crate::error::FactorError;
use crate::store::{from_dense, to_dense, MatrixStore};

/// Cholesky factorization `A = L · Lᵗ` with L lower triangular.
///
/// Defined only for symmetric positive-definite input. Construction itself
/// succeeds for any square matrix and records whether the input actually was
/// SPD; [`CholeskyDecomposition::solve`] refuses to run when it was not, the
/// same split as LU's factor-always / solve-checks contract.
pub struct CholeskyDecomposition {
    l: Array2<f64>,
    n: usize,
    spd: bool,
}

impl CholeskyDecomposition {
    /// Factors a square matrix, reading only its lower triangle and checking
    /// symmetry against the upper one.
    pub fn new<M: MatrixStore>(a: &M) -> Result<Self, FactorError> {
        if a.rows() != a.cols() {
            return Err(FactorError::shape(format!(
                "Cholesky requires a square matrix, got {}x{}",
                a.rows(),
                a.cols()
            )));
        }
        let work = to_dense(a);
        let n = work.nrows();
        let mut l = Array2::zeros((n, n));
        let mut spd = true;

        for j in 0..n {
            let mut d = 0.0;
            for k in 0..j {
                let mut s = 0.0;
                for i in 0..k {
                    s += l[[k, i]] * l[[j, i]];
                }
                let denom = l[[k, k]];
                let entry = if denom != 0.0 {
                    (work[[j, k]] - s) / denom
                } else {
                    // A zero earlier pivot already failed the SPD test.
                    0.0
                };
                l[[j, k]] = entry;
                d += entry * entry;
                spd = spd && work[[k, j]] == work[[j, k]];
            }
            d = work[[j, j]] - d;
            spd = spd && d > 0.0;
            l[[j, j]] = d.max(0.0).sqrt();
        }

        trace!("Cholesky factorization of {}x{}, spd={}", n, n, spd);
        Ok(CholeskyDecomposition { l, n, spd })
    }

    /// Whether the input was symmetric positive definite.
    pub fn is_spd(&self) -> bool {
        self.spd
    }

    /// The lower-triangular factor.
    pub fn l<M: MatrixStore>(&self) -> M {
        from_dense(&self.l)
    }

    /// Solves `A · X = B` by forward substitution against L and back
    /// substitution against Lᵗ. Fails when the input was not SPD.
    pub fn solve<M: MatrixStore>(&self, b: &M) -> Result<M, FactorError> {
        if b.rows() != self.n {
            return Err(FactorError::shape(format!(
                "right-hand side has {} rows, matrix has {}",
                b.rows(),
                self.n
            )));
        }
        if !self.spd {
            return Err(FactorError::singular(
                "matrix is not symmetric positive definite",
            ));
        }

        let n = self.n;
        let nx = b.cols();
        let mut x = to_dense(b);

        for k in 0..n {
            for j in 0..nx {
                for i in 0..k {
                    let f = self.l[[k, i]];
                    x[[k, j]] -= x[[i, j]] * f;
                }
                x[[k, j]] /= self.l[[k, k]];
            }
        }
        for k in (0..n).rev() {
            for j in 0..nx {
                for i in (k + 1)..n {
                    let f = self.l[[i, k]];
                    x[[k, j]] -= x[[i, j]] * f;
                }
                x[[k, j]] /= self.l[[k, k]];
            }
        }

        Ok(from_dense(&x))
    }
}
