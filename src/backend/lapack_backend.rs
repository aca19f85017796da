// LAPACK-backed accelerated implementations via ndarray-linalg.

use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Factorize, FactorizeC, Inverse, Solve, SolveC, QR, UPLO};

use super::AccelBackend;

pub(super) fn factory() -> Option<Arc<dyn AccelBackend>> {
    Some(Arc::new(LapackBackend))
}

/// Delegates to whatever LAPACK provider ndarray-linalg was linked against
/// (OpenBLAS or MKL, chosen by the `backend_openblas*` / `backend_mkl`
/// features).
struct LapackBackend;

// Same exact-equality test the built-in Cholesky engine applies, so an
// asymmetric input is declined here rather than solved from one triangle.
fn is_symmetric(a: &Array2<f64>) -> bool {
    for i in 0..a.nrows() {
        for j in (i + 1)..a.ncols() {
            if a[[i, j]] != a[[j, i]] {
                return false;
            }
        }
    }
    true
}

fn solve_columns<F>(b: &Array2<f64>, solve_one: F) -> Option<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Option<Array1<f64>>,
{
    let mut x = Array2::zeros((b.nrows(), b.ncols()));
    for (j, col) in b.axis_iter(Axis(1)).enumerate() {
        let solved = solve_one(&col.to_owned())?;
        x.column_mut(j).assign(&solved);
    }
    Some(x)
}

impl AccelBackend for LapackBackend {
    fn name(&self) -> &'static str {
        "lapack"
    }

    fn invert(&self, a: &Array2<f64>) -> Option<Array2<f64>> {
        a.inv().ok()
    }

    fn solve(&self, a: &Array2<f64>, b: &Array2<f64>) -> Option<Array2<f64>> {
        // LAPACK's LU solver only covers the square case; dispatch falls
        // back to the built-in QR engine for least squares.
        if a.nrows() != a.ncols() {
            return None;
        }
        let factorized = a.factorize().ok()?;
        solve_columns(b, |col| factorized.solve(col).ok())
    }

    fn solve_symmetric(&self, a: &Array2<f64>, b: &Array2<f64>) -> Option<Array2<f64>> {
        if a.nrows() != a.ncols() || b.nrows() != a.nrows() || !is_symmetric(a) {
            return None;
        }
        let factorized = a.factorizec(UPLO::Lower).ok()?;
        solve_columns(b, |col| factorized.solvec(col).ok())
    }

    fn factor_qr(&self, a: &Array2<f64>) -> Option<(Array2<f64>, Array2<f64>)> {
        if a.nrows() < a.ncols() {
            return None;
        }
        a.qr().ok()
    }
}

#[cfg(test)]
mod lapack_backend_tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn symmetric_solve_declines_asymmetric_input() {
        let backend = LapackBackend;
        // Lower triangle alone is positive definite, but the matrix is not
        // symmetric and must not be solved from it.
        let a = array![[4.0, 9.0], [2.0, 3.0]];
        let b = array![[1.0], [1.0]];
        assert!(backend.solve_symmetric(&a, &b).is_none());
    }
}
