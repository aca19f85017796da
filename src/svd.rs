// Singular value decomposition, Golub-Kahan-Reinsch style.

use log::trace;
use ndarray::Array2;

use crate::store::{to_dense, MatrixStore};

/// Machine epsilon for the convergence tests, 2^-52.
const EPS: f64 = f64::EPSILON;

/// Underflow guard for the convergence tests, 2^-966.
fn tiny() -> f64 {
    2.0_f64.powi(-966)
}

/// Singular value decomposition `A = U · Σ · Vᵗ` of an arbitrary m-by-n real
/// matrix.
///
/// Phase 1 reduces the matrix to bidiagonal form with alternating column and
/// row Householder reflections; phase 2 diagonalizes the bidiagonal with
/// implicitly-shifted QR sweeps, Givens-rotating U and V along the way.
/// Singular values come out non-negative and sorted descending, U and V with
/// orthonormal columns in economy sizes (U is m × min(m, n), V is
/// n × min(m, n)).
///
/// Inputs with more columns than rows are handled by factoring the transpose
/// and swapping the roles of U and V, so `new` accepts any shape.
pub struct SvdDecomposition {
    /// Left singular vectors of the internal (rows ≥ cols) orientation.
    u: Array2<f64>,
    /// Right singular vectors of the internal orientation.
    v: Array2<f64>,
    /// Singular values, descending.
    s: Vec<f64>,
    /// Internal dimensions, rows ≥ cols.
    m: usize,
    n: usize,
    /// Whether the input was transposed to reach the internal orientation.
    transposed: bool,
}

impl SvdDecomposition {
    /// Factors `a`, computing both U and V.
    pub fn new<M: MatrixStore>(a: &M) -> Self {
        let dense = to_dense(a);
        let transposed = dense.nrows() < dense.ncols();
        let work = if transposed { dense.t().to_owned() } else { dense };
        let (m, n) = (work.nrows(), work.ncols());
        let (u, s, v) = golub_kahan_reinsch(work, true, true);
        trace!(
            "SVD of {}x{} complete ({} singular values)",
            m,
            n,
            s.len()
        );
        SvdDecomposition {
            u,
            v,
            s,
            m,
            n,
            transposed,
        }
    }

    /// Singular values, non-negative and non-increasing.
    pub fn singular_values(&self) -> &[f64] {
        &self.s
    }

    /// Σ as a square diagonal matrix of size min(m, n).
    pub fn s<M: MatrixStore>(&self) -> M {
        let k = self.s.len();
        let mut out = M::zeros(k, k);
        for (i, &sv) in self.s.iter().enumerate() {
            out.set(sv, i, i);
        }
        out
    }

    /// Left singular vectors of the original input, shape rows(A) × min(m, n).
    pub fn u<M: MatrixStore>(&self) -> M {
        let src = if self.transposed { &self.v } else { &self.u };
        emit(src)
    }

    /// Right singular vectors of the original input, shape cols(A) × min(m, n).
    pub fn v<M: MatrixStore>(&self) -> M {
        let src = if self.transposed { &self.u } else { &self.v };
        emit(src)
    }

    /// Largest singular value.
    pub fn norm2(&self) -> f64 {
        self.s.first().copied().unwrap_or(0.0)
    }

    /// Ratio of largest to smallest singular value. Infinite when the matrix
    /// is rank deficient.
    pub fn cond(&self) -> f64 {
        match (self.s.first(), self.s.last()) {
            (Some(&first), Some(&last)) => first / last,
            _ => 0.0,
        }
    }

    /// Effective rank: the number of singular values exceeding
    /// `max(m, n) · s[0] · EPS`.
    pub fn rank(&self) -> usize {
        let tol = self.m.max(self.n) as f64 * self.norm2() * EPS;
        self.s.iter().filter(|&&sv| sv > tol).count()
    }

    /// Moore-Penrose pseudo-inverse `V · Σ⁺ · Uᵗ`, shape cols(A) × rows(A).
    ///
    /// Every non-zero singular value is inverted; with `omit_negligible` set,
    /// values at or below the rank tolerance `max(m, n) · s[0] · EPS` are
    /// treated as zero instead.
    pub fn pseudo_inverse<M: MatrixStore>(&self, omit_negligible: bool) -> M {
        let tol = if omit_negligible {
            self.m.max(self.n) as f64 * self.norm2() * EPS
        } else {
            0.0
        };
        self.pseudo_inverse_with_tolerance(tol)
    }

    /// Pseudo-inverse with an explicit cutoff: singular values at or below
    /// `tolerance` contribute nothing.
    pub fn pseudo_inverse_with_tolerance<M: MatrixStore>(&self, tolerance: f64) -> M {
        let (u_pub, v_pub) = if self.transposed {
            (&self.v, &self.u)
        } else {
            (&self.u, &self.v)
        };
        let recip: Vec<f64> = self
            .s
            .iter()
            .map(|&sv| if sv > tolerance && sv > 0.0 { 1.0 / sv } else { 0.0 })
            .collect();

        let rows_out = v_pub.nrows();
        let cols_out = u_pub.nrows();
        let mut out = M::zeros(rows_out, cols_out);
        for i in 0..rows_out {
            for j in 0..cols_out {
                let mut acc = 0.0;
                for (r, &rc) in recip.iter().enumerate() {
                    if rc != 0.0 {
                        acc += v_pub[[i, r]] * rc * u_pub[[j, r]];
                    }
                }
                out.set(acc, i, j);
            }
        }
        out
    }
}

/// Singular values only, skipping the accumulation of U and V.
pub fn singular_values_of<M: MatrixStore>(a: &M) -> Vec<f64> {
    let dense = to_dense(a);
    let work = if dense.nrows() < dense.ncols() {
        dense.t().to_owned()
    } else {
        dense
    };
    let (_, s, _) = golub_kahan_reinsch(work, false, false);
    s
}

fn emit<M: MatrixStore>(src: &Array2<f64>) -> M {
    let mut out = M::zeros(src.nrows(), src.ncols());
    for i in 0..src.nrows() {
        for j in 0..src.ncols() {
            out.set(src[[i, j]], i, j);
        }
    }
    out
}

/// The factorization proper. `a` must have rows ≥ cols. Returns
/// `(U, s, V)` where U is m × n, s has n entries, V is n × n; U and V are
/// empty when not requested.
fn golub_kahan_reinsch(
    mut a: Array2<f64>,
    want_u: bool,
    want_v: bool,
) -> (Array2<f64>, Vec<f64>, Array2<f64>) {
    let m = a.nrows();
    let n = a.ncols();
    debug_assert!(m >= n);

    if m == 0 || n == 0 {
        return (Array2::zeros((m, 0)), Vec::new(), Array2::zeros((n, 0)));
    }

    let nu = n;
    let mut s = vec![0.0f64; n];
    let mut e = vec![0.0f64; n];
    let mut work = vec![0.0f64; m];
    let mut u = if want_u {
        Array2::zeros((m, nu))
    } else {
        Array2::zeros((0, 0))
    };
    let mut v = if want_v {
        Array2::zeros((n, n))
    } else {
        Array2::zeros((0, 0))
    };

    // --- Phase 1: bidiagonalization ---
    // Columns get Householder reflections whose norms land in s, rows get
    // reflections whose norms land in e.
    let nct = (m - 1).min(n);
    let nrt = if n >= 2 { (n - 2).min(m) } else { 0 };
    for k in 0..nct.max(nrt) {
        if k < nct {
            // Column norm via hypot, sign-matched against the diagonal.
            s[k] = 0.0;
            for i in k..m {
                s[k] = s[k].hypot(a[[i, k]]);
            }
            if s[k] != 0.0 {
                if a[[k, k]] < 0.0 {
                    s[k] = -s[k];
                }
                for i in k..m {
                    a[[i, k]] /= s[k];
                }
                a[[k, k]] += 1.0;
            }
            s[k] = -s[k];
        }
        for j in (k + 1)..n {
            if k < nct && s[k] != 0.0 {
                // Apply the column reflection to column j.
                let mut t = 0.0;
                for i in k..m {
                    t += a[[i, k]] * a[[i, j]];
                }
                t = -t / a[[k, k]];
                for i in k..m {
                    a[[i, j]] += t * a[[i, k]];
                }
            }
            // Stash the row entry for the upcoming row reflection.
            e[j] = a[[k, j]];
        }
        if want_u && k < nct {
            for i in k..m {
                u[[i, k]] = a[[i, k]];
            }
        }
        if k < nrt {
            // Row reflection built from the stashed super-diagonal entries.
            e[k] = 0.0;
            for i in (k + 1)..n {
                e[k] = e[k].hypot(e[i]);
            }
            if e[k] != 0.0 {
                if e[k + 1] < 0.0 {
                    e[k] = -e[k];
                }
                for i in (k + 1)..n {
                    e[i] /= e[k];
                }
                e[k + 1] += 1.0;
            }
            e[k] = -e[k];
            if k + 1 < m && e[k] != 0.0 {
                for item in work.iter_mut().take(m).skip(k + 1) {
                    *item = 0.0;
                }
                for j in (k + 1)..n {
                    for i in (k + 1)..m {
                        work[i] += e[j] * a[[i, j]];
                    }
                }
                for j in (k + 1)..n {
                    let t = -e[j] / e[k + 1];
                    for i in (k + 1)..m {
                        a[[i, j]] += t * work[i];
                    }
                }
            }
            if want_v {
                for i in (k + 1)..n {
                    v[[i, k]] = e[i];
                }
            }
        }
    }

    // --- Set up the final bidiagonal ---
    let p_init = n; // min(n, m+1) with m >= n
    if nct < n {
        s[nct] = a[[nct, nct]];
    }
    if m < p_init {
        s[p_init - 1] = 0.0;
    }
    if nrt + 1 < p_init {
        e[nrt] = a[[nrt, p_init - 1]];
    }
    e[p_init - 1] = 0.0;

    // --- Generate U by backward accumulation ---
    if want_u {
        for j in nct..nu {
            for i in 0..m {
                u[[i, j]] = 0.0;
            }
            u[[j, j]] = 1.0;
        }
        for k in (0..nct).rev() {
            if s[k] != 0.0 {
                for j in (k + 1)..nu {
                    let mut t = 0.0;
                    for i in k..m {
                        t += u[[i, k]] * u[[i, j]];
                    }
                    t = -t / u[[k, k]];
                    for i in k..m {
                        u[[i, j]] += t * u[[i, k]];
                    }
                }
                for i in k..m {
                    u[[i, k]] = -u[[i, k]];
                }
                u[[k, k]] += 1.0;
                for i in 0..k.saturating_sub(1) {
                    u[[i, k]] = 0.0;
                }
            } else {
                for i in 0..m {
                    u[[i, k]] = 0.0;
                }
                u[[k, k]] = 1.0;
            }
        }
    }

    // --- Generate V by backward accumulation ---
    if want_v {
        for k in (0..n).rev() {
            if k < nrt && e[k] != 0.0 {
                for j in (k + 1)..nu {
                    let mut t = 0.0;
                    for i in (k + 1)..n {
                        t += v[[i, k]] * v[[i, j]];
                    }
                    t = -t / v[[k + 1, k]];
                    for i in (k + 1)..n {
                        v[[i, j]] += t * v[[i, k]];
                    }
                }
            }
            for i in 0..n {
                v[[i, k]] = 0.0;
            }
            v[[k, k]] = 1.0;
        }
    }

    // --- Phase 2: iterative diagonalization of the bidiagonal ---
    let mut p = p_init;
    let pp = p - 1;
    let tiny = tiny();
    while p > 0 {
        // Classify the trailing unreduced block. k scans for a negligible
        // super-diagonal entry; ks then scans for a negligible diagonal.
        let mut k: isize = p as isize - 2;
        while k >= 0 {
            let ku = k as usize;
            if e[ku].abs() <= tiny + EPS * (s[ku].abs() + s[ku + 1].abs()) {
                e[ku] = 0.0;
                break;
            }
            k -= 1;
        }

        let kase;
        if k == p as isize - 2 {
            kase = 4;
        } else {
            let mut ks: isize = p as isize - 1;
            while ks > k {
                let ksu = ks as usize;
                let mut t = 0.0;
                if ks != p as isize {
                    t += e[ksu].abs();
                }
                if ks != k + 1 {
                    t += e[ksu - 1].abs();
                }
                if s[ksu].abs() <= tiny + EPS * t {
                    s[ksu] = 0.0;
                    break;
                }
                ks -= 1;
            }
            if ks == k {
                kase = 3;
            } else if ks == p as isize - 1 {
                kase = 1;
            } else {
                kase = 2;
                k = ks;
            }
        }
        let k = (k + 1) as usize;

        match kase {
            // Deflate: s[p-1] is negligible. Zero e[p-2] and rotate the
            // superdiagonal away, touching V.
            1 => {
                let mut f = e[p - 2];
                e[p - 2] = 0.0;
                for j in (k..p - 1).rev() {
                    let mut t = s[j].hypot(f);
                    let cs = s[j] / t;
                    let sn = f / t;
                    s[j] = t;
                    if j != k {
                        f = -sn * e[j - 1];
                        e[j - 1] *= cs;
                    }
                    if want_v {
                        for i in 0..n {
                            t = cs * v[[i, j]] + sn * v[[i, p - 1]];
                            v[[i, p - 1]] = -sn * v[[i, j]] + cs * v[[i, p - 1]];
                            v[[i, j]] = t;
                        }
                    }
                }
            }
            // Split: s[k-1] is negligible. Givens rotations detach the block,
            // touching U.
            2 => {
                let mut f = e[k - 1];
                e[k - 1] = 0.0;
                for j in k..p {
                    let mut t = s[j].hypot(f);
                    let cs = s[j] / t;
                    let sn = f / t;
                    s[j] = t;
                    f = -sn * e[j];
                    e[j] *= cs;
                    if want_u {
                        for i in 0..m {
                            t = cs * u[[i, j]] + sn * u[[i, k - 1]];
                            u[[i, k - 1]] = -sn * u[[i, j]] + cs * u[[i, k - 1]];
                            u[[i, j]] = t;
                        }
                    }
                }
            }
            // One implicitly-shifted QR sweep with a Wilkinson-style shift
            // from the trailing 2x2, chasing the bulge with Givens rotations.
            3 => {
                let scale = s[p - 1]
                    .abs()
                    .max(s[p - 2].abs())
                    .max(e[p - 2].abs())
                    .max(s[k].abs())
                    .max(e[k].abs());
                let sp = s[p - 1] / scale;
                let spm1 = s[p - 2] / scale;
                let epm1 = e[p - 2] / scale;
                let sk = s[k] / scale;
                let ek = e[k] / scale;
                let b = ((spm1 + sp) * (spm1 - sp) + epm1 * epm1) / 2.0;
                let c = (sp * epm1) * (sp * epm1);
                let mut shift = 0.0;
                if b != 0.0 || c != 0.0 {
                    shift = (b * b + c).sqrt();
                    if b < 0.0 {
                        shift = -shift;
                    }
                    shift = c / (b + shift);
                }
                let mut f = (sk + sp) * (sk - sp) + shift;
                let mut g = sk * ek;

                for j in k..(p - 1) {
                    let mut t = f.hypot(g);
                    let mut cs = f / t;
                    let mut sn = g / t;
                    if j != k {
                        e[j - 1] = t;
                    }
                    f = cs * s[j] + sn * e[j];
                    e[j] = cs * e[j] - sn * s[j];
                    g = sn * s[j + 1];
                    s[j + 1] *= cs;
                    if want_v {
                        for i in 0..n {
                            t = cs * v[[i, j]] + sn * v[[i, j + 1]];
                            v[[i, j + 1]] = -sn * v[[i, j]] + cs * v[[i, j + 1]];
                            v[[i, j]] = t;
                        }
                    }
                    t = f.hypot(g);
                    cs = f / t;
                    sn = g / t;
                    s[j] = t;
                    f = cs * e[j] + sn * s[j + 1];
                    s[j + 1] = -sn * e[j] + cs * s[j + 1];
                    g = sn * e[j + 1];
                    e[j + 1] *= cs;
                    if want_u && j < m - 1 {
                        for i in 0..m {
                            t = cs * u[[i, j]] + sn * u[[i, j + 1]];
                            u[[i, j + 1]] = -sn * u[[i, j]] + cs * u[[i, j + 1]];
                            u[[i, j]] = t;
                        }
                    }
                }
                e[p - 2] = f;
            }
            // Convergence: flip a negative singular value (and its V column),
            // then bubble it into descending order against the already
            // converged tail, shrinking the active problem.
            _ => {
                let mut k = k;
                if s[k] <= 0.0 {
                    s[k] = if s[k] < 0.0 { -s[k] } else { 0.0 };
                    if want_v {
                        for i in 0..=pp {
                            v[[i, k]] = -v[[i, k]];
                        }
                    }
                }
                while k < pp {
                    if s[k] >= s[k + 1] {
                        break;
                    }
                    s.swap(k, k + 1);
                    if want_v && k < n - 1 {
                        for i in 0..n {
                            v.swap([i, k], [i, k + 1]);
                        }
                    }
                    if want_u && k < m - 1 {
                        for i in 0..m {
                            u.swap([i, k], [i, k + 1]);
                        }
                    }
                    k += 1;
                }
                p -= 1;
            }
        }
    }

    (u, s, v)
}
