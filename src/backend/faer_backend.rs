// Pure-Rust accelerated implementations via faer.

use std::sync::Arc;

use faer::linalg::solvers::{Llt, PartialPivLu, Solve as FaerSolve};
use faer::{Mat, MatRef, Side};
use ndarray::Array2;

use super::AccelBackend;

pub(super) fn factory() -> Option<Arc<dyn AccelBackend>> {
    Some(Arc::new(FaerBackend))
}

struct FaerBackend;

fn to_faer(a: &Array2<f64>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn to_ndarray(a: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.nrows(), a.ncols()), |(i, j)| a[(i, j)])
}

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

impl AccelBackend for FaerBackend {
    fn name(&self) -> &'static str {
        "faer"
    }

    fn invert(&self, a: &Array2<f64>) -> Option<Array2<f64>> {
        if a.nrows() != a.ncols() {
            return None;
        }
        let mat = to_faer(a);
        let lu = PartialPivLu::new(mat.as_ref());
        let eye = Mat::<f64>::identity(a.nrows(), a.ncols());
        let inv = lu.solve(eye.as_ref());
        // A singular input surfaces as non-finite entries; decline so the
        // built-in engine can produce the proper singularity error.
        if inv.col_iter().any(|col| col.iter().any(|v| !v.is_finite())) {
            return None;
        }
        Some(to_ndarray(inv.as_ref()))
    }

    fn solve(&self, a: &Array2<f64>, b: &Array2<f64>) -> Option<Array2<f64>> {
        if a.nrows() != a.ncols() || b.nrows() != a.nrows() {
            return None;
        }
        let mat = to_faer(a);
        let rhs = to_faer(b);
        let lu = PartialPivLu::new(mat.as_ref());
        let x = lu.solve(rhs.as_ref());
        if x.col_iter().any(|col| col.iter().any(|v| !v.is_finite())) {
            return None;
        }
        Some(to_ndarray(x.as_ref()))
    }

    fn solve_symmetric(&self, a: &Array2<f64>, b: &Array2<f64>) -> Option<Array2<f64>> {
        if a.nrows() != a.ncols() || b.nrows() != a.nrows() || !is_symmetric(a) {
            return None;
        }
        let mat = to_faer(a);
        let llt = Llt::new(mat.as_ref(), Side::Lower).ok()?;
        let rhs = to_faer(b);
        Some(to_ndarray(llt.solve(rhs.as_ref()).as_ref()))
    }
}

#[cfg(test)]
mod faer_backend_tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn symmetric_solve_declines_asymmetric_input() {
        let backend = FaerBackend;
        // Lower triangle alone is positive definite, but the matrix is not
        // symmetric and must not be solved from it.
        let a = array![[4.0, 9.0], [2.0, 3.0]];
        let b = array![[1.0], [1.0]];
        assert!(backend.solve_symmetric(&a, &b).is_none());
    }

    #[test]
    fn symmetric_solve_handles_spd_input() {
        let backend = FaerBackend;
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![[8.0], [7.0]];
        let x = backend.solve_symmetric(&a, &b).unwrap();
        assert_abs_diff_eq!(a.dot(&x), b, epsilon = 1e-10);
    }
}
