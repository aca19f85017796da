// Dense real-matrix factorization kernels with pluggable backend dispatch.

#![doc = include_str!("../README.md")]

pub mod backend;
pub mod cholesky;
pub mod dispatch;
mod error;
pub mod ginv;
pub mod lu;
pub mod pinv;
pub mod qr;
pub mod store;
pub mod svd;

pub use backend::{try_resolve, AccelBackend, Operation};
pub use cholesky::CholeskyDecomposition;
pub use dispatch::{
    classify, config, factor_lu, factor_qr, invert, set_config, set_number_of_threads,
    set_size_threshold, set_tolerance_epsilon, solve, solve_symmetric, Bucket, DispatchConfig,
    LuFactors, QrFactors, SizeClass, ThreadClass,
};
pub use error::FactorError;
pub use ginv::{generalized_inverse, generalized_inverse_with_tolerance, reduce};
pub use lu::LuDecomposition;
pub use pinv::{pseudo_inverse, PseudoInverse};
pub use qr::QrDecomposition;
pub use store::{from_rows, identity, multiply, transpose, MatrixStore};
pub use svd::{singular_values_of, SvdDecomposition};
