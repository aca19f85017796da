// Moore-Penrose pseudo-inverse, derived lazily from the SVD.

use log::debug;
use once_cell::sync::OnceCell;

use crate::dispatch;
use crate::store::MatrixStore;
use crate::svd::SvdDecomposition;

/// Lazily computed, per-instance-memoized Moore-Penrose inverse.
///
/// The SVD behind the inverse is expensive, so nothing happens at
/// construction; the first element access (or call to
/// [`PseudoInverse::matrix`]) runs the decomposition once and caches the
/// result for the lifetime of this instance. The cache is per instance, not
/// global — two instances over the same source each compute their own copy.
pub struct PseudoInverse<M: MatrixStore> {
    source: M,
    cached: OnceCell<M>,
}

impl<M: MatrixStore> PseudoInverse<M> {
    /// Wraps `source` without computing anything yet.
    pub fn new(source: M) -> Self {
        PseudoInverse {
            source,
            cached: OnceCell::new(),
        }
    }

    /// Rows of the pseudo-inverse (columns of the source).
    pub fn rows(&self) -> usize {
        self.source.cols()
    }

    /// Columns of the pseudo-inverse (rows of the source).
    pub fn cols(&self) -> usize {
        self.source.rows()
    }

    /// The materialized inverse, computing it on first access.
    pub fn matrix(&self) -> &M {
        self.cached.get_or_init(|| {
            debug!(
                "computing pseudo-inverse of {}x{} on first access",
                self.source.rows(),
                self.source.cols()
            );
            compute(&self.source)
        })
    }

    /// Reads an entry of the inverse, triggering the computation if needed.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.matrix().get(row, col)
    }

    /// Whether the inverse has been computed yet.
    pub fn is_computed(&self) -> bool {
        self.cached.get().is_some()
    }
}

/// One-shot pseudo-inverse: SVD, invert every singular value above the
/// process-wide tolerance (others become zero), return `V · Σ⁺ · Uᵗ`.
pub fn pseudo_inverse<M: MatrixStore>(a: &M) -> M {
    compute(a)
}

fn compute<M: MatrixStore>(a: &M) -> M {
    let svd = SvdDecomposition::new(a);
    svd.pseudo_inverse_with_tolerance(dispatch::tolerance_epsilon())
}

#[cfg(test)]
mod pinv_tests {
    use super::*;
    use crate::lu::LuDecomposition;
    use crate::store::{identity, multiply};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(m: usize, n: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((m, n), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn matches_lu_inverse_for_full_rank_square() {
        let a = random_matrix(5, 5, 51);
        let pinv = pseudo_inverse(&a);
        let lu_inv = LuDecomposition::new(&a)
            .solve(&identity::<Array2<f64>>(5))
            .unwrap();
        assert_abs_diff_eq!(pinv, lu_inv, epsilon = 1e-8);
    }

    #[test]
    fn lazy_instance_computes_once_on_first_access() {
        let a = random_matrix(4, 3, 52);
        let lazy = PseudoInverse::new(a.clone());
        assert!(!lazy.is_computed());
        assert_eq!(lazy.rows(), 3);
        assert_eq!(lazy.cols(), 4);
        assert!(!lazy.is_computed());

        let first = lazy.get(0, 0);
        assert!(lazy.is_computed());
        // Repeated access reads the memoized matrix.
        assert_eq!(lazy.get(0, 0), first);
        let expected = pseudo_inverse(&a);
        assert_abs_diff_eq!(*lazy.matrix(), expected, epsilon = 1e-12);
    }

    #[test]
    fn penrose_conditions_for_rectangular_input() {
        let a = random_matrix(6, 3, 53);
        let p = pseudo_inverse(&a);
        let apa = multiply(&multiply(&a, &p).unwrap(), &a).unwrap();
        let pap = multiply(&multiply(&p, &a).unwrap(), &p).unwrap();
        assert_abs_diff_eq!(apa, a, epsilon = 1e-8);
        assert_abs_diff_eq!(pap, p, epsilon = 1e-8);
    }

    #[test]
    fn singular_matrix_gets_rank_truncated_inverse() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let p = pseudo_inverse(&a);
        // The reflexive property holds even though A is singular.
        let pap = multiply(&multiply(&p, &a).unwrap(), &p).unwrap();
        assert_abs_diff_eq!(pap, p, epsilon = 1e-10);
    }
}
