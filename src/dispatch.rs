// Size/thread-aware operation dispatch with accelerated-backend fallback.

use std::sync::RwLock;

use log::debug;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;

use crate::backend::{self, Operation};
use crate::cholesky::CholeskyDecomposition;
use crate::error::FactorError;
use crate::lu::LuDecomposition;
use crate::qr::QrDecomposition;
use crate::store::{self, from_dense, to_dense, MatrixStore};

/// Process-wide dispatch configuration.
///
/// Read afresh at the start of every dispatch call — there is no snapshot or
/// versioning, so a configuration change takes effect on the next call. The
/// values live behind a read-write lock; concurrent writers therefore see
/// last-writer-wins rather than undefined behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    /// Thread-count hint used only to pick a candidate bucket. None of the
    /// built-in engines spawn threads; parallel execution is entirely the
    /// business of whichever accelerated backend gets selected.
    pub number_of_threads: usize,
    /// A matrix is "large" when both dimensions reach this threshold.
    pub size_threshold: usize,
    /// Cutoff below which entries are treated as zero during pivoting, rank
    /// determination, and pseudo-inverse construction.
    pub tolerance_epsilon: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            number_of_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            size_threshold: 100,
            tolerance_epsilon: 1e-10,
        }
    }
}

static CONFIG: Lazy<RwLock<DispatchConfig>> = Lazy::new(|| RwLock::new(DispatchConfig::default()));

/// A copy of the current configuration.
pub fn config() -> DispatchConfig {
    *CONFIG.read().expect("dispatch configuration lock poisoned")
}

/// Replaces the whole configuration at once.
pub fn set_config(config: DispatchConfig) {
    let mut guard = CONFIG.write().expect("dispatch configuration lock poisoned");
    *guard = DispatchConfig {
        number_of_threads: config.number_of_threads.max(1),
        ..config
    };
}

/// Sets the thread-count hint; values below 1 are clamped to 1.
pub fn set_number_of_threads(threads: usize) {
    let mut guard = CONFIG.write().expect("dispatch configuration lock poisoned");
    guard.number_of_threads = threads.max(1);
}

/// Sets the small/large size threshold.
pub fn set_size_threshold(threshold: usize) {
    let mut guard = CONFIG.write().expect("dispatch configuration lock poisoned");
    guard.size_threshold = threshold;
}

/// Sets the zero-tolerance used during pivoting and rank decisions.
pub fn set_tolerance_epsilon(epsilon: f64) {
    let mut guard = CONFIG.write().expect("dispatch configuration lock poisoned");
    guard.tolerance_epsilon = epsilon;
}

/// The current zero-tolerance.
pub fn tolerance_epsilon() -> f64 {
    config().tolerance_epsilon
}

/// Size half of the bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Small,
    Large,
}

/// Thread half of the bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadClass {
    Single,
    Multi,
}

/// One of the four strategy buckets {small, large} × {single, multi}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub size: SizeClass,
    pub threads: ThreadClass,
}

/// Pure bucket selection: a matrix is large only when both dimensions reach
/// the threshold, and multi-threaded candidates are considered only when the
/// thread hint exceeds one.
pub fn classify(rows: usize, cols: usize, config: &DispatchConfig) -> Bucket {
    let size = if rows >= config.size_threshold && cols >= config.size_threshold {
        SizeClass::Large
    } else {
        SizeClass::Small
    };
    let threads = if config.number_of_threads > 1 {
        ThreadClass::Multi
    } else {
        ThreadClass::Single
    };
    Bucket { size, threads }
}

/// The L, U, P factors returned by [`factor_lu`], with `P · A = L · U`.
pub struct LuFactors<M> {
    pub l: M,
    pub u: M,
    pub p: M,
}

/// The Q, R factors returned by [`factor_qr`], with `A = Q · R`.
pub struct QrFactors<M> {
    pub q: M,
    pub r: M,
}

/// Inverse of a square nonsingular matrix.
///
/// Candidates from the bucket's backend list are tried in order; when none
/// is available (or all decline) the built-in LU engine solves against the
/// identity.
pub fn invert<M: MatrixStore>(a: &M) -> Result<M, FactorError> {
    let (rows, cols) = (a.rows(), a.cols());
    if rows != cols {
        return Err(FactorError::shape(format!(
            "inverse requires a square matrix, got {}x{}",
            rows, cols
        )));
    }
    let bucket = classify(rows, cols, &config());
    // The dense copy only happens if a backend candidate actually resolves.
    let dense = OnceCell::new();
    if let Some(out) = backend::attempt(Operation::Invert, bucket, |b| {
        b.invert(dense.get_or_init(|| to_dense(a)))
    }) {
        return Ok(from_dense(&out));
    }
    debug!("invert {}x{} on built-in LU engine ({:?})", rows, cols, bucket);
    LuDecomposition::new(a).solve(&store::identity::<M>(rows))
}

/// LU factorization through the dispatch layer.
pub fn factor_lu<M: MatrixStore>(a: &M) -> LuFactors<M> {
    let bucket = classify(a.rows(), a.cols(), &config());
    let dense = OnceCell::new();
    if let Some((l, u, p)) = backend::attempt(Operation::FactorLu, bucket, |b| {
        b.factor_lu(dense.get_or_init(|| to_dense(a)))
    }) {
        return LuFactors {
            l: from_dense(&l),
            u: from_dense(&u),
            p: from_dense(&p),
        };
    }
    debug!(
        "factor_lu {}x{} on built-in engine ({:?})",
        a.rows(),
        a.cols(),
        bucket
    );
    let lu = LuDecomposition::new(a);
    LuFactors {
        l: lu.l(),
        u: lu.u(),
        p: lu.p(),
    }
}

/// QR factorization through the dispatch layer. Requires rows ≥ columns.
pub fn factor_qr<M: MatrixStore>(a: &M) -> Result<QrFactors<M>, FactorError> {
    if a.rows() < a.cols() {
        return Err(FactorError::shape(format!(
            "QR requires rows >= columns, got {}x{}",
            a.rows(),
            a.cols()
        )));
    }
    let bucket = classify(a.rows(), a.cols(), &config());
    let dense = OnceCell::new();
    if let Some((q, r)) = backend::attempt(Operation::FactorQr, bucket, |b| {
        b.factor_qr(dense.get_or_init(|| to_dense(a)))
    }) {
        return Ok(QrFactors {
            q: from_dense(&q),
            r: from_dense(&r),
        });
    }
    debug!(
        "factor_qr {}x{} on built-in engine ({:?})",
        a.rows(),
        a.cols(),
        bucket
    );
    let qr = QrDecomposition::new(a)?;
    Ok(QrFactors {
        q: qr.q(),
        r: qr.r(),
    })
}

/// Solves `A · X = B`: exactly via LU for square A, least squares via QR for
/// overdetermined A. Underdetermined systems are a shape error; callers
/// wanting a minimum-norm answer should go through the generalized or
/// pseudo-inverse instead.
pub fn solve<M: MatrixStore>(a: &M, b: &M) -> Result<M, FactorError> {
    let (rows, cols) = (a.rows(), a.cols());
    if rows < cols {
        return Err(FactorError::shape(format!(
            "solve requires rows >= columns, got {}x{}",
            rows, cols
        )));
    }
    if b.rows() != rows {
        return Err(FactorError::shape(format!(
            "right-hand side has {} rows, matrix has {}",
            b.rows(),
            rows
        )));
    }
    let bucket = classify(rows, cols, &config());
    let dense = OnceCell::new();
    if let Some(out) = backend::attempt(Operation::Solve, bucket, |be| {
        let (da, db) = dense.get_or_init(|| (to_dense(a), to_dense(b)));
        be.solve(da, db)
    }) {
        return Ok(from_dense(&out));
    }
    debug!("solve {}x{} on built-in engine ({:?})", rows, cols, bucket);
    if rows == cols {
        LuDecomposition::new(a).solve(b)
    } else {
        QrDecomposition::new(a)?.solve(b)
    }
}

/// Solves `A · X = B` for symmetric positive-definite A via Cholesky.
pub fn solve_symmetric<M: MatrixStore>(a: &M, b: &M) -> Result<M, FactorError> {
    let (rows, cols) = (a.rows(), a.cols());
    if rows != cols {
        return Err(FactorError::shape(format!(
            "symmetric solve requires a square matrix, got {}x{}",
            rows, cols
        )));
    }
    let bucket = classify(rows, cols, &config());
    let dense = OnceCell::new();
    if let Some(out) = backend::attempt(Operation::SolveSymmetric, bucket, |be| {
        let (da, db) = dense.get_or_init(|| (to_dense(a), to_dense(b)));
        be.solve_symmetric(da, db)
    }) {
        return Ok(from_dense(&out));
    }
    debug!(
        "solve_symmetric {}x{} on built-in Cholesky engine ({:?})",
        rows, cols, bucket
    );
    CholeskyDecomposition::new(a)?.solve(b)
}

#[cfg(test)]
mod dispatch_tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use std::sync::Mutex;

    // The configuration is process-wide; tests that touch it take this lock
    // so they do not race each other under the parallel test runner.
    static CONFIG_GUARD: Mutex<()> = Mutex::new(());

    fn with_config<R>(config: DispatchConfig, body: impl FnOnce() -> R) -> R {
        let _guard = CONFIG_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let previous = super::config();
        set_config(config);
        let out = body();
        set_config(previous);
        out
    }

    #[test]
    fn classify_covers_all_four_buckets() {
        let config = DispatchConfig {
            number_of_threads: 1,
            size_threshold: 10,
            tolerance_epsilon: 1e-10,
        };
        assert_eq!(
            classify(5, 5, &config),
            Bucket {
                size: SizeClass::Small,
                threads: ThreadClass::Single
            }
        );
        assert_eq!(
            classify(10, 10, &config),
            Bucket {
                size: SizeClass::Large,
                threads: ThreadClass::Single
            }
        );
        let multi = DispatchConfig {
            number_of_threads: 8,
            ..config
        };
        assert_eq!(
            classify(5, 50, &multi),
            Bucket {
                size: SizeClass::Small,
                threads: ThreadClass::Multi
            }
        );
        assert_eq!(
            classify(100, 100, &multi),
            Bucket {
                size: SizeClass::Large,
                threads: ThreadClass::Multi
            }
        );
    }

    #[test]
    fn large_needs_both_dimensions_at_threshold() {
        let config = DispatchConfig {
            number_of_threads: 1,
            size_threshold: 10,
            tolerance_epsilon: 1e-10,
        };
        assert_eq!(classify(100, 9, &config).size, SizeClass::Small);
        assert_eq!(classify(9, 100, &config).size, SizeClass::Small);
    }

    #[test]
    fn thread_hint_is_clamped_to_one() {
        let _guard = CONFIG_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let previous = config();
        set_number_of_threads(0);
        assert_eq!(config().number_of_threads, 1);
        set_config(previous);
    }

    #[test]
    fn invert_rejects_non_square() {
        let a = Array2::<f64>::zeros((2, 3));
        assert!(matches!(invert(&a), Err(FactorError::Shape(_))));
    }

    #[test]
    fn invert_matches_reference_values() {
        let a = array![[1.0, 4.0, 3.0], [2.0, 1.0, 7.0], [3.0, 2.0, 1.0]];
        let inv = invert(&a).unwrap();
        let expected = array![
            [-0.1970, 0.0303, 0.3788],
            [0.2879, -0.1212, -0.0152],
            [0.0152, 0.1515, -0.1061]
        ];
        assert_abs_diff_eq!(inv, expected, epsilon = 1e-3);
    }

    #[test]
    fn every_bucket_falls_back_to_the_built_in_engine() {
        let a = array![[4.0, 7.0], [2.0, 6.0]];
        let direct = crate::lu::LuDecomposition::new(&a)
            .solve(&crate::store::identity::<Array2<f64>>(2))
            .unwrap();

        let buckets = [
            (1usize, 100usize), // small, single
            (8, 100),           // small, multi
            (1, 2),             // large, single
            (8, 2),             // large, multi
        ];
        for (threads, threshold) in buckets {
            let config = DispatchConfig {
                number_of_threads: threads,
                size_threshold: threshold,
                tolerance_epsilon: 1e-10,
            };
            let inv = with_config(config, || invert(&a).unwrap());
            assert_abs_diff_eq!(inv, direct, epsilon = 1e-12);
        }
    }

    #[cfg(not(any(feature = "backend_lapack", feature = "backend_faer")))]
    #[test]
    fn fallback_invert_reads_the_source_no_more_than_the_direct_engine() {
        use std::cell::Cell;

        struct CountingStore {
            inner: Array2<f64>,
            reads: Cell<usize>,
        }

        impl MatrixStore for CountingStore {
            fn rows(&self) -> usize {
                self.inner.nrows()
            }
            fn cols(&self) -> usize {
                self.inner.ncols()
            }
            fn get(&self, row: usize, col: usize) -> f64 {
                self.reads.set(self.reads.get() + 1);
                self.inner[[row, col]]
            }
            fn set(&mut self, value: f64, row: usize, col: usize) {
                self.inner[[row, col]] = value;
            }
            fn zeros(rows: usize, cols: usize) -> Self {
                CountingStore {
                    inner: Array2::zeros((rows, cols)),
                    reads: Cell::new(0),
                }
            }
        }

        let a = array![[4.0, 7.0], [2.0, 6.0]];

        let dispatched = CountingStore {
            inner: a.clone(),
            reads: Cell::new(0),
        };
        invert(&dispatched).unwrap();

        // With no backend resolved, dispatch must not read the source any
        // more often than handing it straight to the engine does.
        let direct = CountingStore {
            inner: a,
            reads: Cell::new(0),
        };
        crate::lu::LuDecomposition::new(&direct)
            .solve(&crate::store::identity::<CountingStore>(2))
            .unwrap();

        assert_eq!(dispatched.reads.get(), direct.reads.get());
    }

    #[test]
    fn solve_dispatches_on_shape() {
        let square = array![[2.0, 0.0], [0.0, 4.0]];
        let b = array![[2.0], [8.0]];
        let x = solve(&square, &b).unwrap();
        assert_abs_diff_eq!(x, array![[1.0], [2.0]], epsilon = 1e-12);

        let tall = array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let b_tall = array![[3.0], [4.0], [0.0]];
        let x_tall = solve(&tall, &b_tall).unwrap();
        assert_abs_diff_eq!(x_tall, array![[3.0], [4.0]], epsilon = 1e-12);

        let wide = Array2::<f64>::zeros((2, 3));
        let b_wide = Array2::<f64>::zeros((2, 1));
        assert!(matches!(
            solve(&wide, &b_wide),
            Err(FactorError::Shape(_))
        ));
    }

    #[test]
    fn solve_symmetric_uses_cholesky_semantics() {
        let spd = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![[8.0], [7.0]];
        let x = solve_symmetric(&spd, &b).unwrap();
        let back = crate::store::multiply(&spd, &x).unwrap();
        assert_abs_diff_eq!(back, b, epsilon = 1e-10);

        let indefinite = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            solve_symmetric(&indefinite, &b),
            Err(FactorError::Singular(_))
        ));
    }

    #[test]
    fn factor_entry_points_return_consistent_factors() {
        let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let lu = factor_lu(&a);
        let pa = crate::store::multiply(&lu.p, &a).unwrap();
        let lxu = crate::store::multiply(&lu.l, &lu.u).unwrap();
        assert_abs_diff_eq!(pa, lxu, epsilon = 1e-10);

        let qr = factor_qr(&a).unwrap();
        let recomposed = crate::store::multiply(&qr.q, &qr.r).unwrap();
        assert_abs_diff_eq!(recomposed, a, epsilon = 1e-10);
    }
}
