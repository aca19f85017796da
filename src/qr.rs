// QR factorization via Householder reflections.

use log::trace;
use ndarray::Array2;

use crate::error::FactorError;
use crate::store::{from_dense, to_dense, MatrixStore};

/// Householder QR factorization of an m-by-n matrix with m ≥ n.
///
/// The reflections are stored packed: the strict lower trapezoid of the
/// working copy holds the Householder vectors, the strict upper triangle
/// holds R's off-diagonal entries, and `r_diag` holds R's diagonal. `Q` is
/// only materialized on request, by backward accumulation of the stored
/// reflections.
pub struct QrDecomposition {
    qr: Array2<f64>,
    m: usize,
    n: usize,
    r_diag: Vec<f64>,
}

impl QrDecomposition {
    /// Factors `a`, which must have at least as many rows as columns.
    ///
    /// Column norms are accumulated with `hypot` so very large or very small
    /// entries neither overflow nor underflow, and the norm's sign is matched
    /// against the diagonal entry before negation for stability.
    pub fn new<M: MatrixStore>(a: &M) -> Result<Self, FactorError> {
        let m = a.rows();
        let n = a.cols();
        if m < n {
            return Err(FactorError::shape(format!(
                "QR requires rows >= columns, got {}x{}",
                m, n
            )));
        }
        let mut qr = to_dense(a);
        let mut r_diag = vec![0.0; n];

        for k in 0..n {
            let mut nrm = 0.0f64;
            for i in k..m {
                nrm = nrm.hypot(qr[[i, k]]);
            }

            if nrm != 0.0 {
                if qr[[k, k]] < 0.0 {
                    nrm = -nrm;
                }
                for i in k..m {
                    qr[[i, k]] /= nrm;
                }
                qr[[k, k]] += 1.0;

                // Apply the reflection to the remaining columns.
                for j in (k + 1)..n {
                    let mut s = 0.0;
                    for i in k..m {
                        s += qr[[i, k]] * qr[[i, j]];
                    }
                    s = -s / qr[[k, k]];
                    for i in k..m {
                        qr[[i, j]] += s * qr[[i, k]];
                    }
                }
            }
            r_diag[k] = -nrm;
        }

        trace!("QR factorization of {}x{} complete", m, n);
        Ok(QrDecomposition { qr, m, n, r_diag })
    }

    /// True iff R has no zero diagonal entry.
    pub fn is_full_rank(&self) -> bool {
        self.r_diag.iter().all(|&d| d != 0.0)
    }

    /// The orthogonal factor, shape m × n, reconstructed by backward
    /// accumulation of the stored Householder vectors.
    pub fn q<M: MatrixStore>(&self) -> M {
        let (m, n) = (self.m, self.n);
        let mut q = Array2::zeros((m, n));
        for k in (0..n).rev() {
            for i in 0..m {
                q[[i, k]] = 0.0;
            }
            q[[k, k]] = 1.0;
            for j in k..n {
                if self.qr[[k, k]] != 0.0 {
                    let mut s = 0.0;
                    for i in k..m {
                        s += self.qr[[i, k]] * q[[i, j]];
                    }
                    s = -s / self.qr[[k, k]];
                    for i in k..m {
                        q[[i, j]] += s * self.qr[[i, k]];
                    }
                }
            }
        }
        from_dense(&q)
    }

    /// The upper-triangular factor, shape n × n.
    pub fn r<M: MatrixStore>(&self) -> M {
        let n = self.n;
        let mut out = M::zeros(n, n);
        for i in 0..n {
            out.set(self.r_diag[i], i, i);
            for j in (i + 1)..n {
                out.set(self.qr[[i, j]], i, j);
            }
        }
        out
    }

    /// Lower-trapezoidal matrix of packed Householder vectors, shape m × n.
    pub fn h<M: MatrixStore>(&self) -> M {
        let mut out = M::zeros(self.m, self.n);
        for j in 0..self.n {
            for i in j..self.m {
                out.set(self.qr[[i, j]], i, j);
            }
        }
        out
    }

    /// Least-squares solve of `A · X = B`: applies the stored reflections to
    /// B (computing `Qᵗ · B` without materializing Q) and back-substitutes
    /// against R, returning the first n rows. The remaining m − n rows of the
    /// transformed B belong to the residual space and are discarded.
    pub fn solve<M: MatrixStore>(&self, b: &M) -> Result<M, FactorError> {
        if b.rows() != self.m {
            return Err(FactorError::shape(format!(
                "right-hand side has {} rows, matrix has {}",
                b.rows(),
                self.m
            )));
        }
        if !self.is_full_rank() {
            return Err(FactorError::singular(
                "R has a zero diagonal entry; matrix is rank deficient",
            ));
        }

        let (m, n) = (self.m, self.n);
        let nx = b.cols();
        let mut x = to_dense(b);

        // Y = Qᵗ · B, one reflection at a time.
        for k in 0..n {
            for j in 0..nx {
                let mut s = 0.0;
                for i in k..m {
                    s += self.qr[[i, k]] * x[[i, j]];
                }
                s = -s / self.qr[[k, k]];
                for i in k..m {
                    x[[i, j]] += s * self.qr[[i, k]];
                }
            }
        }
        // Back substitution against R.
        for k in (0..n).rev() {
            for j in 0..nx {
                x[[k, j]] /= self.r_diag[k];
            }
            for i in 0..k {
                let f = self.qr[[i, k]];
                for j in 0..nx {
                    x[[i, j]] -= x[[k, j]] * f;
                }
            }
        }

        let mut out = M::zeros(n, nx);
        for i in 0..n {
            for j in 0..nx {
                out.set(x[[i, j]], i, j);
            }
        }
        Ok(out)
    }
}
