// Accelerated-backend registry and candidate resolution.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};
use ndarray::Array2;
use once_cell::sync::Lazy;

use crate::dispatch::{Bucket, SizeClass, ThreadClass};

#[cfg(feature = "backend_faer")]
mod faer_backend;
#[cfg(feature = "backend_lapack")]
mod lapack_backend;

/// The operations the dispatch layer can delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Invert,
    FactorLu,
    FactorQr,
    Solve,
    SolveSymmetric,
}

/// An optionally-available accelerated implementation.
///
/// Every method returns `Option`: `None` means "this backend declines the
/// operation" — either it does not implement it at all (the defaults) or it
/// failed at run time — and the dispatch layer silently moves on to the next
/// candidate. Backends work on plain dense buffers; the dispatch layer owns
/// the conversion from and to the caller's matrix contract.
pub trait AccelBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn invert(&self, _a: &Array2<f64>) -> Option<Array2<f64>> {
        None
    }

    fn solve(&self, _a: &Array2<f64>, _b: &Array2<f64>) -> Option<Array2<f64>> {
        None
    }

    fn solve_symmetric(&self, _a: &Array2<f64>, _b: &Array2<f64>) -> Option<Array2<f64>> {
        None
    }

    #[allow(clippy::type_complexity)]
    fn factor_lu(&self, _a: &Array2<f64>) -> Option<(Array2<f64>, Array2<f64>, Array2<f64>)> {
        None
    }

    fn factor_qr(&self, _a: &Array2<f64>) -> Option<(Array2<f64>, Array2<f64>)> {
        None
    }
}

type BackendFactory = fn() -> Option<Arc<dyn AccelBackend>>;

/// Identifier-to-factory table, populated at process start from whatever
/// optional backend features were compiled in. An absent feature simply
/// leaves its identifier unregistered; resolution then returns `None`
/// instead of failing.
static REGISTRY: Lazy<HashMap<&'static str, BackendFactory>> = Lazy::new(|| {
    #[allow(unused_mut)]
    let mut table: HashMap<&'static str, BackendFactory> = HashMap::new();
    #[cfg(feature = "backend_lapack")]
    table.insert("lapack", lapack_backend::factory as BackendFactory);
    #[cfg(feature = "backend_faer")]
    table.insert("faer", faer_backend::factory as BackendFactory);
    table
});

/// Resolves a candidate identifier, returning `None` for unknown identifiers
/// or factories that decline to instantiate. Never raises.
pub fn try_resolve(id: &str) -> Option<Arc<dyn AccelBackend>> {
    match REGISTRY.get(id) {
        Some(factory) => factory(),
        None => {
            trace!("backend '{}' is not registered", id);
            None
        }
    }
}

/// Ordered candidate list per (operation, bucket).
///
/// LAPACK-class backends front the large buckets, where the BLAS kernels pay
/// off; the pure-Rust candidate leads for small work. The factorization
/// operations only probe backends that can hand factor matrices back.
pub fn candidates(op: Operation, bucket: Bucket) -> &'static [&'static str] {
    match op {
        Operation::Invert | Operation::Solve | Operation::SolveSymmetric => {
            match (bucket.size, bucket.threads) {
                (SizeClass::Small, ThreadClass::Single) => &["faer"],
                (SizeClass::Small, ThreadClass::Multi) => &["faer", "lapack"],
                (SizeClass::Large, ThreadClass::Single) => &["lapack", "faer"],
                (SizeClass::Large, ThreadClass::Multi) => &["lapack", "faer"],
            }
        }
        Operation::FactorLu | Operation::FactorQr => match (bucket.size, bucket.threads) {
            (SizeClass::Small, _) => &["lapack"],
            (SizeClass::Large, _) => &["lapack"],
        },
    }
}

/// Walks a bucket's candidate list, resolving each identifier anew on every
/// call (so backends can be hot-swapped between calls), and returns the first
/// successful result. `None` means the caller should run the built-in engine.
pub(crate) fn attempt<T>(
    op: Operation,
    bucket: Bucket,
    run: impl Fn(&dyn AccelBackend) -> Option<T>,
) -> Option<T> {
    for id in candidates(op, bucket) {
        match try_resolve(id) {
            Some(backend) => {
                if let Some(out) = run(backend.as_ref()) {
                    debug!("{:?} handled by backend '{}'", op, backend.name());
                    return Some(out);
                }
                trace!("backend '{}' declined {:?}", id, op);
            }
            None => trace!("backend '{}' unavailable for {:?}, skipping", id, op),
        }
    }
    None
}
