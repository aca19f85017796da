// Generalized inverse via fully pivoted Gauss-Jordan elimination.

use log::{debug, trace};
use ndarray::Array2;

use crate::dispatch;
use crate::error::FactorError;
use crate::store::{to_dense, MatrixStore};

/// Generalized inverse `A12` of an arbitrary m-by-n matrix, including
/// singular and rectangular inputs, using the process-wide tolerance from
/// the dispatch configuration as the pivot cutoff.
///
/// The result has shape n × m and satisfies `A12 · A · A12 = A12`; when A has
/// full rank in the relevant sense it additionally satisfies
/// `(A · A12) · A = A`.
pub fn generalized_inverse<M: MatrixStore>(a: &M) -> M {
    generalized_inverse_with_tolerance(a, dispatch::tolerance_epsilon())
}

/// Generalized inverse with an explicit pivot tolerance.
///
/// Two square accumulators record the elimination: S (n × n) collects the
/// column operations and T (m × m) the row operations, both starting from
/// the identity. Each step brings the maximum-magnitude entry of the
/// remaining submatrix to the diagonal (full pivoting, rows and columns),
/// normalizes its row, and eliminates the rest of its row and column,
/// mirroring every operation into S or T. Elimination stops early once the
/// best remaining pivot falls to or below `tolerance` — the effective rank
/// is exhausted — and the inverse is the product of S and T restricted to
/// the rank actually achieved.
pub fn generalized_inverse_with_tolerance<M: MatrixStore>(a: &M, tolerance: f64) -> M {
    let mut work = to_dense(a);
    let m = work.nrows();
    let n = work.ncols();
    let mut s_acc: Array2<f64> = Array2::eye(n);
    let mut t_acc: Array2<f64> = Array2::eye(m);
    let mut rank = 0;

    for diag in 0..m.min(n) {
        // Full pivot search over the remaining submatrix.
        let mut pi = diag;
        let mut pj = diag;
        let mut best = 0.0;
        for i in diag..m {
            for j in diag..n {
                let mag = work[[i, j]].abs();
                if mag > best {
                    best = mag;
                    pi = i;
                    pj = j;
                }
            }
        }
        if best <= tolerance {
            trace!(
                "generalized inverse: pivot magnitude {:e} at step {} is below tolerance, rank exhausted",
                best,
                diag
            );
            break;
        }

        if pi != diag {
            for j in 0..n {
                work.swap([pi, j], [diag, j]);
            }
            for j in 0..m {
                t_acc.swap([pi, j], [diag, j]);
            }
        }
        if pj != diag {
            for i in 0..m {
                work.swap([i, pj], [i, diag]);
            }
            for i in 0..n {
                s_acc.swap([i, pj], [i, diag]);
            }
        }

        // Normalize the pivot row, propagating into T.
        let pivot = work[[diag, diag]];
        for j in 0..n {
            work[[diag, j]] /= pivot;
        }
        for j in 0..m {
            t_acc[[diag, j]] /= pivot;
        }

        // Eliminate below the pivot (row operations, into T).
        for i in (diag + 1)..m {
            let f = work[[i, diag]];
            if f != 0.0 {
                for j in 0..n {
                    work[[i, j]] -= f * work[[diag, j]];
                }
                for j in 0..m {
                    t_acc[[i, j]] -= f * t_acc[[diag, j]];
                }
            }
        }
        // Eliminate to the right of the pivot (column operations, into S).
        for j in (diag + 1)..n {
            let f = work[[diag, j]];
            if f != 0.0 {
                for i in 0..m {
                    let sub = f * work[[i, diag]];
                    work[[i, j]] -= sub;
                }
                for i in 0..n {
                    let sub = f * s_acc[[i, diag]];
                    s_acc[[i, j]] -= sub;
                }
            }
        }

        rank = diag + 1;
    }

    debug!(
        "generalized inverse of {}x{} computed with effective rank {}",
        m, n, rank
    );

    // A12 = S[:, 0..rank] · T[0..rank, :], shape n x m.
    let mut out = M::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            let mut acc = 0.0;
            for r in 0..rank {
                acc += s_acc[[i, r]] * t_acc[[r, j]];
            }
            out.set(acc, i, j);
        }
    }
    out
}

/// Bandwidth reduction for square matrices.
///
/// Greedily applies symmetric row/column swaps that move non-zero entries
/// closer to the diagonal, accepting a swap only when it strictly lowers the
/// total diagonal distance of the non-zero pattern without widening the band
/// — the widening check is what keeps the existing zero pattern intact for
/// downstream sparse-aware consumers. Returns the reordering vector:
/// position `i` of the reduced matrix holds original index `order[i]`.
pub fn reduce<M: MatrixStore>(a: &M) -> Result<Vec<usize>, FactorError> {
    if a.rows() != a.cols() {
        return Err(FactorError::shape(format!(
            "bandwidth reduction requires a square matrix, got {}x{}",
            a.rows(),
            a.cols()
        )));
    }
    let n = a.rows();
    let pattern: Vec<Vec<bool>> = (0..n)
        .map(|i| (0..n).map(|j| a.get(i, j) != 0.0).collect())
        .collect();
    let mut order: Vec<usize> = (0..n).collect();

    let cost_of = |order: &[usize]| -> (usize, usize) {
        let mut total = 0;
        let mut band = 0;
        for (i, &oi) in order.iter().enumerate() {
            for (j, &oj) in order.iter().enumerate() {
                if pattern[oi][oj] {
                    let dist = i.abs_diff(j);
                    total += dist;
                    band = band.max(dist);
                }
            }
        }
        (total, band)
    };

    let (mut total, mut band) = cost_of(&order);
    // Each accepted swap strictly lowers the total distance, so the loop
    // terminates; the pass cap only bounds pathological inputs.
    for _pass in 0..n {
        let mut improved = false;
        for i in 0..n {
            for j in (i + 1)..n {
                order.swap(i, j);
                let (cand_total, cand_band) = cost_of(&order);
                if cand_total < total && cand_band <= band {
                    total = cand_total;
                    band = cand_band;
                    improved = true;
                } else {
                    order.swap(i, j);
                }
            }
        }
        if !improved {
            break;
        }
    }

    trace!(
        "bandwidth reduction of {}x{}: final bandwidth {}, distance sum {}",
        n,
        n,
        band,
        total
    );
    Ok(order)
}
