// LU factorization with partial (row) pivoting.

use log::trace;
use ndarray::Array2;

use crate::error::FactorError;
use crate::store::{from_dense, to_dense, MatrixStore};

/// Crout-style LU factorization of an m-by-n matrix with partial pivoting.
///
/// Produces a unit-lower-triangular `L`, an upper-triangular `U`, and a row
/// permutation so that `P · A = L · U`. The factorization itself never fails,
/// whatever the shape or rank of the input; singularity only matters (and is
/// reported) when [`LuDecomposition::solve`] or [`LuDecomposition::det`] is
/// called.
pub struct LuDecomposition {
    /// Packed L (strict lower part) and U (upper part, including diagonal).
    lu: Array2<f64>,
    m: usize,
    n: usize,
    /// Row permutation: row `i` of the factored matrix is row `piv[i]` of A.
    piv: Vec<usize>,
    /// +1.0 or -1.0, flipped on every row swap.
    pivsign: f64,
}

impl LuDecomposition {
    /// Factors `a`. For each column the remaining rows are reduced by a
    /// dot-product recurrence against the already-computed entries, the row
    /// with the largest magnitude in the partially-reduced column is swapped
    /// into pivot position, and the sub-diagonal entries are divided by the
    /// pivot to form the strict lower part of L.
    pub fn new<M: MatrixStore>(a: &M) -> Self {
        let mut lu = to_dense(a);
        let m = lu.nrows();
        let n = lu.ncols();
        let mut piv: Vec<usize> = (0..m).collect();
        let mut pivsign = 1.0;
        let mut col_j = vec![0.0; m];

        for j in 0..n {
            for i in 0..m {
                col_j[i] = lu[[i, j]];
            }

            // Dot-product recurrence for column j against prior columns.
            for i in 0..m {
                let kmax = i.min(j);
                let mut s = 0.0;
                for k in 0..kmax {
                    s += lu[[i, k]] * col_j[k];
                }
                col_j[i] -= s;
                lu[[i, j]] = col_j[i];
            }

            // Pivot: largest magnitude in the reduced column, at or below j.
            let mut p = j;
            for i in (j + 1)..m {
                if col_j[i].abs() > col_j[p].abs() {
                    p = i;
                }
            }
            if p != j {
                for k in 0..n {
                    lu.swap([p, k], [j, k]);
                }
                piv.swap(p, j);
                pivsign = -pivsign;
            }

            if j < m && lu[[j, j]] != 0.0 {
                let pivot = lu[[j, j]];
                for i in (j + 1)..m {
                    lu[[i, j]] /= pivot;
                }
            }
        }

        trace!("LU factorization of {}x{} complete, pivot sign {}", m, n, pivsign);
        LuDecomposition {
            lu,
            m,
            n,
            piv,
            pivsign,
        }
    }

    /// True iff every diagonal entry of U is non-zero.
    pub fn is_nonsingular(&self) -> bool {
        for j in 0..self.n.min(self.m) {
            if self.lu[[j, j]] == 0.0 {
                return false;
            }
        }
        true
    }

    /// Unit-lower-triangular factor, shape m × min(m, n).
    pub fn l<M: MatrixStore>(&self) -> M {
        let k = self.m.min(self.n);
        let mut out = M::zeros(self.m, k);
        for i in 0..self.m {
            for j in 0..k {
                if i > j {
                    out.set(self.lu[[i, j]], i, j);
                } else if i == j {
                    out.set(1.0, i, j);
                }
            }
        }
        out
    }

    /// Upper-triangular factor, shape min(m, n) × n.
    pub fn u<M: MatrixStore>(&self) -> M {
        let k = self.m.min(self.n);
        let mut out = M::zeros(k, self.n);
        for i in 0..k {
            for j in i..self.n {
                out.set(self.lu[[i, j]], i, j);
            }
        }
        out
    }

    /// Row-permutation matrix P with `P · A = L · U`.
    pub fn p<M: MatrixStore>(&self) -> M {
        let mut out = M::zeros(self.m, self.m);
        for (i, &src) in self.piv.iter().enumerate() {
            out.set(1.0, i, src);
        }
        out
    }

    /// The pivot vector: row `i` of the permuted matrix is row `piv()[i]` of A.
    pub fn pivot(&self) -> &[usize] {
        &self.piv
    }

    /// +1.0 or -1.0 depending on the parity of row swaps performed.
    pub fn pivot_sign(&self) -> f64 {
        self.pivsign
    }

    /// Determinant of a square input: pivot sign times the product of U's
    /// diagonal.
    pub fn det(&self) -> Result<f64, FactorError> {
        if self.m != self.n {
            return Err(FactorError::shape(format!(
                "determinant requires a square matrix, got {}x{}",
                self.m, self.n
            )));
        }
        let mut d = self.pivsign;
        for j in 0..self.n {
            d *= self.lu[[j, j]];
        }
        Ok(d)
    }

    /// Solves `A · X = B`. Requires A square and nonsingular, and
    /// `b.rows() == a.rows()`.
    ///
    /// B's rows are permuted by the stored pivot vector, then forward
    /// substitution runs against L (unit diagonal, so no division) and back
    /// substitution against U (dividing by the diagonal).
    pub fn solve<M: MatrixStore>(&self, b: &M) -> Result<M, FactorError> {
        if self.m != self.n {
            return Err(FactorError::shape(format!(
                "LU solve requires a square matrix, got {}x{}",
                self.m, self.n
            )));
        }
        if b.rows() != self.m {
            return Err(FactorError::shape(format!(
                "right-hand side has {} rows, matrix has {}",
                b.rows(),
                self.m
            )));
        }
        if !self.is_nonsingular() {
            return Err(FactorError::singular(
                "zero diagonal entry in U; system has no unique solution",
            ));
        }

        let n = self.n;
        let nx = b.cols();
        let mut x = Array2::zeros((n, nx));
        for i in 0..n {
            for j in 0..nx {
                x[[i, j]] = b.get(self.piv[i], j);
            }
        }

        // Forward substitution against unit-lower L.
        for k in 0..n {
            for i in (k + 1)..n {
                let f = self.lu[[i, k]];
                if f != 0.0 {
                    for j in 0..nx {
                        x[[i, j]] -= x[[k, j]] * f;
                    }
                }
            }
        }
        // Back substitution against U.
        for k in (0..n).rev() {
            let d = self.lu[[k, k]];
            for j in 0..nx {
                x[[k, j]] /= d;
            }
            for i in 0..k {
                let f = self.lu[[i, k]];
                if f != 0.0 {
                    for j in 0..nx {
                        x[[i, j]] -= x[[k, j]] * f;
                    }
                }
            }
        }

        Ok(from_dense(&x))
    }
}
