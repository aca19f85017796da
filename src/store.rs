// Matrix contract consumed by every factorization engine.

use ndarray::Array2;

use crate::error::FactorError;

/// Minimal rectangular-matrix contract.
///
/// Every engine in this crate is generic over any implementation of this
/// trait: a 2-D dense real-valued container with row/column counts and
/// random-access get/set. Engines never retain a reference to a caller's
/// matrix beyond the call that produced a result; outputs are freshly
/// constructed through [`MatrixStore::zeros`].
///
/// The canonical implementation is [`ndarray::Array2<f64>`], but storage
/// backends living outside this crate (disk-backed, tiled, compressed)
/// plug in by implementing these five methods.
pub trait MatrixStore {
    /// Number of rows.
    fn rows(&self) -> usize;

    /// Number of columns.
    fn cols(&self) -> usize;

    /// Reads the entry at `(row, col)`.
    fn get(&self, row: usize, col: usize) -> f64;

    /// Writes `value` at `(row, col)`.
    fn set(&mut self, value: f64, row: usize, col: usize);

    /// Constructs a zero-filled matrix of the given dimensions.
    fn zeros(rows: usize, cols: usize) -> Self
    where
        Self: Sized;
}

impl MatrixStore for Array2<f64> {
    fn rows(&self) -> usize {
        self.nrows()
    }

    fn cols(&self) -> usize {
        self.ncols()
    }

    fn get(&self, row: usize, col: usize) -> f64 {
        self[[row, col]]
    }

    fn set(&mut self, value: f64, row: usize, col: usize) {
        self[[row, col]] = value;
    }

    fn zeros(rows: usize, cols: usize) -> Self {
        Array2::zeros((rows, cols))
    }
}

/// Identity matrix of the given size, built through the contract.
pub fn identity<M: MatrixStore>(size: usize) -> M {
    let mut out = M::zeros(size, size);
    for i in 0..size {
        out.set(1.0, i, i);
    }
    out
}

/// Transpose built through the contract.
pub fn transpose<M: MatrixStore>(a: &M) -> M {
    let (m, n) = (a.rows(), a.cols());
    let mut out = M::zeros(n, m);
    for i in 0..m {
        for j in 0..n {
            out.set(a.get(i, j), j, i);
        }
    }
    out
}

/// Builds a contract matrix from row slices. Every row must have the same
/// length; the first row fixes the column count.
pub fn from_rows<M: MatrixStore>(rows: &[Vec<f64>]) -> Result<M, FactorError> {
    let m = rows.len();
    let n = rows.first().map_or(0, |r| r.len());
    let mut out = M::zeros(m, n);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != n {
            return Err(FactorError::shape(format!(
                "row {} has {} entries, expected {}",
                i,
                row.len(),
                n
            )));
        }
        for (j, &value) in row.iter().enumerate() {
            out.set(value, i, j);
        }
    }
    Ok(out)
}

/// Plain triple-loop matrix product `a · b` through the contract.
///
/// The engines only ever multiply small factors (accumulators, inverses),
/// so no blocking or backend acceleration is attempted here.
pub fn multiply<M: MatrixStore>(a: &M, b: &M) -> Result<M, FactorError> {
    if a.cols() != b.rows() {
        return Err(FactorError::shape(format!(
            "cannot multiply {}x{} by {}x{}",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    let (m, k, n) = (a.rows(), a.cols(), b.cols());
    let mut out = M::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0;
            for r in 0..k {
                acc += a.get(i, r) * b.get(r, j);
            }
            out.set(acc, i, j);
        }
    }
    Ok(out)
}

/// Copies a contract matrix into the dense working representation the
/// engines compute on.
pub(crate) fn to_dense<M: MatrixStore>(a: &M) -> Array2<f64> {
    let (m, n) = (a.rows(), a.cols());
    Array2::from_shape_fn((m, n), |(i, j)| a.get(i, j))
}

/// Emits a dense working buffer back out through the contract.
pub(crate) fn from_dense<M: MatrixStore>(a: &Array2<f64>) -> M {
    let (m, n) = (a.nrows(), a.ncols());
    let mut out = M::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            out.set(a[[i, j]], i, j);
        }
    }
    out
}

#[cfg(test)]
mod store_tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn contract_round_trip_through_dense() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let dense = to_dense(&a);
        let back: Array2<f64> = from_dense(&dense);
        assert_eq!(back, a);
    }

    #[test]
    fn identity_and_multiply() {
        let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let eye: Array2<f64> = identity(2);
        let prod = multiply(&a, &eye).expect("shapes are compatible");
        assert_abs_diff_eq!(prod, a, epsilon = 1e-12);
    }

    #[test]
    fn multiply_rejects_mismatched_inner_dimension() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[1.0, 2.0, 3.0]];
        assert!(matches!(
            multiply(&a, &b),
            Err(crate::FactorError::Shape(_))
        ));
    }

    #[test]
    fn from_rows_builds_the_expected_matrix() {
        let m: Array2<f64> =
            from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(m, array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        let ragged = [vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            from_rows::<Array2<f64>>(&ragged),
            Err(crate::FactorError::Shape(_))
        ));
    }

    #[test]
    fn transpose_swaps_dimensions() {
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t: Array2<f64> = transpose(&a);
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 2);
        assert_eq!(t[[2, 1]], 6.0);
    }
}
