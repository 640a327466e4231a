//! Golub-Reinsch singular value decomposition.
//!
//! The decomposition proceeds in four phases over owned buffers:
//!
//! 1. Householder reduction of the input to upper bidiagonal form.
//! 2. Accumulation of the right-hand transforms into `V`.
//! 3. Accumulation of the left-hand transforms into `U`, in place over the
//!    working copy of the input.
//! 4. Diagonalization of the bidiagonal form by implicit-shift QR sweeps.
//!
//! The singular values are returned in the order the sweeps leave them. They
//! are **not** sorted; callers that need a descending order must sort `W` and
//! permute the columns of `U` and `V` themselves.

use log::{debug, trace};

use crate::error::LinalgError;
use crate::matrix::Matrix;

/// Maximum number of implicit QR sweeps spent on a single singular value.
pub const MAX_QR_ITERATIONS: usize = 30;

/// Singular value decomposition `A = U * diag(W) * V^T` of an `m x n` matrix, `m >= n`.
///
/// - `U` is `m x n` with orthonormal columns.
/// - `W` has length `n` and every entry is non-negative. Entries are unsorted.
/// - `V` is `n x n` and orthogonal.
#[derive(Debug, Clone)]
pub struct SingularValueDecomposition {
    u: Matrix,
    w: Vec<f64>,
    v: Matrix,
}

#[inline]
fn sign(a: f64, b: f64) -> f64 {
    if b >= 0.0 {
        a.abs()
    } else {
        -a.abs()
    }
}

/// A value is negligible when adding it to the norm leaves the norm unchanged.
#[inline]
fn negligible(value: f64, anorm: f64) -> bool {
    value.abs() + anorm == anorm
}

impl SingularValueDecomposition {
    /// Decompose a copy of `a`.
    ///
    /// # Errors
    ///
    /// - [`LinalgError::IllegalArgument`] if `a` has fewer rows than columns or no columns.
    /// - [`LinalgError::NoConvergence`] if a non-finite value appears during the
    ///   bidiagonal reduction or in a QR shift, or a singular value needs more
    ///   than [`MAX_QR_ITERATIONS`] sweeps.
    pub fn new(a: &Matrix) -> Result<Self, LinalgError> {
        Self::from_matrix(a.clone())
    }

    /// Decompose `a`, reusing its buffer as the storage for `U`.
    ///
    /// # Errors
    ///
    /// Same as [`SingularValueDecomposition::new`].
    pub fn from_matrix(a: Matrix) -> Result<Self, LinalgError> {
        Self::decompose(a, MAX_QR_ITERATIONS)
    }

    fn decompose(a: Matrix, max_sweeps: usize) -> Result<Self, LinalgError> {
        let (m, n) = (a.rows(), a.cols());
        if n == 0 {
            return Err(LinalgError::IllegalArgument(
                "matrix must have at least one column".to_string(),
            ));
        }
        if m < n {
            return Err(LinalgError::IllegalArgument(format!(
                "matrix must have at least as many rows as columns, got {m}x{n}"
            )));
        }

        let mut svd = Self {
            u: a,
            w: vec![0.0; n],
            v: Matrix::zeros(n, n),
        };
        let mut rv1 = vec![0.0; n];

        let anorm = svd.bidiagonalize(&mut rv1)?;
        svd.accumulate_right(&rv1);
        svd.accumulate_left();
        svd.diagonalize(&mut rv1, anorm, max_sweeps)?;

        Ok(svd)
    }

    /// Householder reduction to bidiagonal form.
    ///
    /// The diagonal lands in `w`, the superdiagonal in `rv1[1..]`. Returns the
    /// running norm estimate used by the splitting tests.
    fn bidiagonalize(&mut self, rv1: &mut [f64]) -> Result<f64, LinalgError> {
        let (m, n) = (self.u.rows(), self.u.cols());
        let u = &mut self.u;
        let w = &mut self.w;

        let mut g = 0.0;
        let mut scale = 0.0;
        let mut anorm: f64 = 0.0;

        for i in 0..n {
            let l = i + 1;
            rv1[i] = scale * g;
            g = 0.0;
            scale = 0.0;

            // left reflection: zero the column below the diagonal
            for k in i..m {
                scale += u[(k, i)].abs();
            }
            if scale != 0.0 {
                let mut s = 0.0;
                for k in i..m {
                    u[(k, i)] /= scale;
                    s += u[(k, i)] * u[(k, i)];
                }
                let f = u[(i, i)];
                g = -sign(s.sqrt(), f);
                let h = f * g - s;
                u[(i, i)] = f - g;
                for j in l..n {
                    let mut s = 0.0;
                    for k in i..m {
                        s += u[(k, i)] * u[(k, j)];
                    }
                    let f = s / h;
                    for k in i..m {
                        let uki = u[(k, i)];
                        u[(k, j)] += f * uki;
                    }
                }
                for k in i..m {
                    u[(k, i)] *= scale;
                }
            }
            w[i] = scale * g;

            g = 0.0;
            scale = 0.0;

            // right reflection: zero the row beyond the superdiagonal
            if i + 1 != n {
                for k in l..n {
                    scale += u[(i, k)].abs();
                }
                if scale != 0.0 {
                    let mut s = 0.0;
                    for k in l..n {
                        u[(i, k)] /= scale;
                        s += u[(i, k)] * u[(i, k)];
                    }
                    let f = u[(i, l)];
                    g = -sign(s.sqrt(), f);
                    let h = f * g - s;
                    u[(i, l)] = f - g;
                    for k in l..n {
                        rv1[k] = u[(i, k)] / h;
                    }
                    for j in l..m {
                        let mut s = 0.0;
                        for k in l..n {
                            s += u[(j, k)] * u[(i, k)];
                        }
                        for k in l..n {
                            u[(j, k)] += s * rv1[k];
                        }
                    }
                    for k in l..n {
                        u[(i, k)] *= scale;
                    }
                }
            }

            if !w[i].is_finite() || !rv1[i].is_finite() {
                debug!("non-finite value during bidiagonalization at column {i}");
                return Err(LinalgError::NoConvergence(format!(
                    "non-finite value during bidiagonalization at column {i}"
                )));
            }
            anorm = anorm.max(w[i].abs() + rv1[i].abs());
        }

        if !anorm.is_finite() {
            return Err(LinalgError::NoConvergence(
                "matrix norm overflowed during bidiagonalization".to_string(),
            ));
        }

        Ok(anorm)
    }

    /// Build `V` from the right-hand Householder vectors stored in the rows of `u`.
    fn accumulate_right(&mut self, rv1: &[f64]) {
        let n = self.u.cols();
        let u = &self.u;
        let v = &mut self.v;

        // the last row reflection was skipped, so the carried value starts at zero
        let mut g = 0.0;
        let mut l = n;
        for i in (0..n).rev() {
            if i + 1 < n {
                if g != 0.0 {
                    for j in l..n {
                        v[(j, i)] = (u[(i, j)] / u[(i, l)]) / g;
                    }
                    for j in l..n {
                        let mut s = 0.0;
                        for k in l..n {
                            s += u[(i, k)] * v[(k, j)];
                        }
                        for k in l..n {
                            let vki = v[(k, i)];
                            v[(k, j)] += s * vki;
                        }
                    }
                }
                for j in l..n {
                    v[(i, j)] = 0.0;
                    v[(j, i)] = 0.0;
                }
            }
            v[(i, i)] = 1.0;
            g = rv1[i];
            l = i;
        }
    }

    /// Build `U` in place from the left-hand Householder vectors.
    fn accumulate_left(&mut self) {
        let (m, n) = (self.u.rows(), self.u.cols());
        let u = &mut self.u;

        for i in (0..n).rev() {
            let l = i + 1;
            let g = self.w[i];
            for j in l..n {
                u[(i, j)] = 0.0;
            }
            if g != 0.0 {
                let g = 1.0 / g;
                for j in l..n {
                    let mut s = 0.0;
                    for k in l..m {
                        s += u[(k, i)] * u[(k, j)];
                    }
                    let f = (s / u[(i, i)]) * g;
                    for k in i..m {
                        let uki = u[(k, i)];
                        u[(k, j)] += f * uki;
                    }
                }
                for j in i..m {
                    u[(j, i)] *= g;
                }
            } else {
                for j in i..m {
                    u[(j, i)] = 0.0;
                }
            }
            u[(i, i)] += 1.0;
        }
    }

    /// Diagonalize the bidiagonal form with implicit-shift QR sweeps, at most
    /// `max_sweeps` per singular value.
    fn diagonalize(
        &mut self,
        rv1: &mut [f64],
        anorm: f64,
        max_sweeps: usize,
    ) -> Result<(), LinalgError> {
        let (m, n) = (self.u.rows(), self.u.cols());
        let u = &mut self.u;
        let v = &mut self.v;
        let w = &mut self.w;

        for k in (0..n).rev() {
            let mut its = 0;
            loop {
                // look for a split point l such that rv1[l] is negligible
                let mut cancel = true;
                let mut l = k;
                loop {
                    if l == 0 || negligible(rv1[l], anorm) {
                        cancel = false;
                        break;
                    }
                    if negligible(w[l - 1], anorm) {
                        break;
                    }
                    l -= 1;
                }

                if cancel {
                    // w[l - 1] is negligible: chase rv1[l] out with rotations
                    let nm = l - 1;
                    let mut c = 0.0;
                    let mut s = 1.0;
                    for i in l..=k {
                        let f = s * rv1[i];
                        rv1[i] *= c;
                        if negligible(f, anorm) {
                            break;
                        }
                        let g = w[i];
                        let h = f.hypot(g);
                        w[i] = h;
                        let h = 1.0 / h;
                        c = g * h;
                        s = -f * h;
                        for j in 0..m {
                            let y = u[(j, nm)];
                            let z = u[(j, i)];
                            u[(j, nm)] = y * c + z * s;
                            u[(j, i)] = z * c - y * s;
                        }
                    }
                }

                let z = w[k];
                if l == k {
                    // converged: make the singular value non-negative
                    if z < 0.0 {
                        w[k] = -z;
                        for j in 0..n {
                            v[(j, k)] = -v[(j, k)];
                        }
                    }
                    trace!("singular value {k} converged after {its} sweeps");
                    break;
                }

                if its + 1 >= max_sweeps {
                    debug!("singular value {k} did not converge in {max_sweeps} sweeps");
                    return Err(LinalgError::NoConvergence(format!(
                        "singular value {k} did not converge in {max_sweeps} iterations"
                    )));
                }
                its += 1;

                // Wilkinson shift from the trailing 2x2 minor
                let mut x = w[l];
                let nm = k - 1;
                let mut y = w[nm];
                let mut g = rv1[nm];
                let mut h = rv1[k];
                let mut f = ((y - z) * (y + z) + (g - h) * (g + h)) / (2.0 * h * y);
                g = f.hypot(1.0);
                f = ((x - z) * (x + z) + h * ((y / (f + sign(g, f))) - h)) / x;
                if !f.is_finite() {
                    debug!("non-finite shift while diagonalizing singular value {k}");
                    return Err(LinalgError::NoConvergence(format!(
                        "non-finite shift for singular value {k} after {its} iterations"
                    )));
                }

                // chase the bulge down the bidiagonal
                let mut c = 1.0;
                let mut s = 1.0;
                for j in l..=nm {
                    let i = j + 1;
                    g = rv1[i];
                    y = w[i];
                    h = s * g;
                    g *= c;
                    let mut z = f.hypot(h);
                    rv1[j] = z;
                    c = f / z;
                    s = h / z;
                    f = x * c + g * s;
                    g = g * c - x * s;
                    h = y * s;
                    y *= c;
                    for jj in 0..n {
                        let vx = v[(jj, j)];
                        let vz = v[(jj, i)];
                        v[(jj, j)] = vx * c + vz * s;
                        v[(jj, i)] = vz * c - vx * s;
                    }
                    z = f.hypot(h);
                    w[j] = z;
                    if z != 0.0 {
                        let zinv = 1.0 / z;
                        c = f * zinv;
                        s = h * zinv;
                    }
                    f = c * g + s * y;
                    x = c * y - s * g;
                    for jj in 0..m {
                        let uy = u[(jj, j)];
                        let uz = u[(jj, i)];
                        u[(jj, j)] = uy * c + uz * s;
                        u[(jj, i)] = uz * c - uy * s;
                    }
                }
                rv1[l] = 0.0;
                rv1[k] = f;
                w[k] = x;
            }
        }

        Ok(())
    }

    /// Left singular vectors, `m x n`.
    pub fn u(&self) -> &Matrix {
        &self.u
    }

    /// Singular values, length `n`, non-negative and unsorted.
    pub fn w(&self) -> &[f64] {
        &self.w
    }

    /// Right singular vectors, `n x n`.
    pub fn v(&self) -> &Matrix {
        &self.v
    }

    /// Largest singular value.
    pub fn max_singular_value(&self) -> f64 {
        self.w.iter().fold(0.0f64, |acc, &x| acc.max(x))
    }

    /// Zero every singular value below `threshold * max(W)`.
    ///
    /// Returns the number of singular values below the cutoff, which are all zero
    /// afterwards. Calling it twice with the same threshold leaves `W` unchanged
    /// the second time.
    pub fn clip_singular_values(&mut self, threshold: f64) -> usize {
        let cutoff = threshold * self.max_singular_value();
        let mut clipped = 0;
        for wj in self.w.iter_mut() {
            if *wj < cutoff {
                *wj = 0.0;
                clipped += 1;
            }
        }
        clipped
    }

    /// Number of singular values strictly above `threshold * max(W)`.
    pub fn rank(&self, threshold: f64) -> usize {
        let cutoff = threshold * self.max_singular_value();
        self.w.iter().filter(|&&x| x > cutoff).count()
    }

    /// Ratio of the largest to the smallest singular value.
    ///
    /// Infinite when the smallest singular value is zero.
    pub fn condition_number(&self) -> f64 {
        let min = self.w.iter().fold(f64::INFINITY, |acc, &x| acc.min(x));
        if min == 0.0 {
            f64::INFINITY
        } else {
            self.max_singular_value() / min
        }
    }

    /// Minimum-norm least-squares solution `x = V * diag(1/W) * U^T * b`.
    ///
    /// Zero singular values contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::IllegalArgument`] if `b.len()` differs from the row count.
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
        let (m, n) = (self.u.rows(), self.u.cols());
        if b.len() != m {
            return Err(LinalgError::length_mismatch("right-hand side", m, b.len()));
        }

        let tmp: Vec<f64> = (0..n)
            .map(|j| {
                if self.w[j] == 0.0 {
                    0.0
                } else {
                    let s: f64 = (0..m).map(|i| self.u[(i, j)] * b[i]).sum();
                    s / self.w[j]
                }
            })
            .collect();

        Ok((0..n)
            .map(|j| self.v.row(j).iter().zip(&tmp).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// Covariance `V * diag(1/W^2) * V^T` of the least-squares parameters.
    ///
    /// Zero singular values contribute nothing.
    pub fn covariance(&self) -> Matrix {
        let n = self.w.len();
        let wti: Vec<f64> = self
            .w
            .iter()
            .map(|&x| if x == 0.0 { 0.0 } else { 1.0 / (x * x) })
            .collect();

        let mut cvm = Matrix::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let sum: f64 = (0..n)
                    .map(|k| self.v[(i, k)] * self.v[(j, k)] * wti[k])
                    .sum();
                cvm[(i, j)] = sum;
                cvm[(j, i)] = sum;
            }
        }
        cvm
    }

    /// Rebuild `U * diag(W) * V^T` in fresh storage.
    pub fn reconstruct(&self) -> Matrix {
        let (m, n) = (self.u.rows(), self.u.cols());
        let mut out = Matrix::zeros(m, n);
        for i in 0..m {
            for j in 0..n {
                out[(i, j)] = (0..n)
                    .map(|k| self.u[(i, k)] * self.w[k] * self.v[(j, k)])
                    .sum();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_orthonormal_columns(m: &Matrix, eps: f64) {
        let gram = m.transpose().matmul(m).unwrap();
        for i in 0..gram.rows() {
            for j in 0..gram.cols() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(gram[(i, j)], expected, epsilon = eps);
            }
        }
    }

    #[test]
    fn test_svd_reconstructs_rectangular() -> Result<(), LinalgError> {
        let a = Matrix::from_rows(&[
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 10.0],
            [-1.0, 0.5, 2.0],
        ])?;
        let svd = SingularValueDecomposition::new(&a)?;

        assert_eq!(svd.u().rows(), 4);
        assert_eq!(svd.u().cols(), 3);
        assert_eq!(svd.v().rows(), 3);
        assert!(svd.w().iter().all(|&x| x >= 0.0));

        let r = svd.reconstruct();
        for i in 0..4 {
            for j in 0..3 {
                assert_relative_eq!(r[(i, j)], a[(i, j)], epsilon = 1e-10);
            }
        }
        assert_orthonormal_columns(svd.u(), 1e-10);
        assert_orthonormal_columns(svd.v(), 1e-10);
        Ok(())
    }

    #[test]
    fn test_svd_singular_values_are_unsorted() -> Result<(), LinalgError> {
        // a diagonal input keeps its diagonal order, which here is ascending
        let a = Matrix::from_rows(&[[1.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 3.0]])?;
        let svd = SingularValueDecomposition::new(&a)?;
        assert_relative_eq!(svd.w()[0], 1.0, epsilon = 1e-14);
        assert_relative_eq!(svd.w()[1], 2.0, epsilon = 1e-14);
        assert_relative_eq!(svd.w()[2], 3.0, epsilon = 1e-14);
        Ok(())
    }

    #[test]
    fn test_svd_rank_deficient() -> Result<(), LinalgError> {
        let a = Matrix::from_rows(&[[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]])?;
        let mut svd = SingularValueDecomposition::new(&a)?;
        assert_eq!(svd.rank(1e-10), 1);

        let clipped = svd.clip_singular_values(1e-10);
        assert_eq!(clipped, 1);
        let w_once = svd.w().to_vec();
        assert_eq!(svd.clip_singular_values(1e-10), 1);
        assert_eq!(svd.w(), w_once.as_slice());
        assert!(svd.condition_number().is_infinite());
        Ok(())
    }

    #[test]
    fn test_svd_wide_matrix_rejected() {
        let a = Matrix::zeros(2, 3);
        assert!(matches!(
            SingularValueDecomposition::new(&a),
            Err(LinalgError::IllegalArgument(_))
        ));
    }

    #[test]
    fn test_svd_nan_input() -> Result<(), LinalgError> {
        let a = Matrix::from_rows(&[[1.0, f64::NAN], [0.0, 1.0]])?;
        assert!(matches!(
            SingularValueDecomposition::new(&a),
            Err(LinalgError::NoConvergence(_))
        ));
        Ok(())
    }

    #[test]
    fn test_svd_sweep_cap() -> Result<(), LinalgError> {
        let a = Matrix::from_rows(&[
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 10.0],
            [-1.0, 0.5, 2.0],
        ])?;
        match SingularValueDecomposition::decompose(a.clone(), 1) {
            Err(LinalgError::NoConvergence(msg)) => {
                assert!(msg.contains("did not converge in 1 iterations"))
            }
            other => panic!("expected NoConvergence, got {other:?}"),
        }
        assert!(SingularValueDecomposition::decompose(a, MAX_QR_ITERATIONS).is_ok());
        Ok(())
    }

    #[test]
    fn test_svd_huge_entries_fail_to_converge() -> Result<(), LinalgError> {
        // the shift of the trailing minor overflows long before 30 sweeps
        let a = Matrix::from_rows(&[
            [1.0e200, 2.0e200, 3.0e200],
            [4.0e200, 5.0e200, 6.0e200],
            [7.0e200, 8.0e200, 10.0e200],
            [-1.0e200, 0.5e200, 2.0e200],
        ])?;
        assert!(matches!(
            SingularValueDecomposition::new(&a),
            Err(LinalgError::NoConvergence(_))
        ));
        Ok(())
    }

    #[test]
    fn test_svd_solve_minimum_norm() -> Result<(), LinalgError> {
        // x + y = 2 has the minimum-norm solution (1, 1)
        let a = Matrix::from_rows(&[[1.0, 1.0], [0.0, 0.0]])?;
        let mut svd = SingularValueDecomposition::new(&a)?;
        svd.clip_singular_values(1e-10);
        let x = svd.solve(&[2.0, 0.0])?;
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_svd_solve_length_mismatch() -> Result<(), LinalgError> {
        let svd = SingularValueDecomposition::new(&Matrix::identity(2))?;
        assert!(svd.solve(&[1.0]).is_err());
        Ok(())
    }

    #[test]
    fn test_svd_covariance_matches_normal_inverse() -> Result<(), LinalgError> {
        let a = Matrix::from_rows(&[[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]])?;
        let svd = SingularValueDecomposition::new(&a)?;
        let cov = svd.covariance();
        let expected = a.transpose().matmul(&a)?.inverse()?;
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(cov[(i, j)], expected[(i, j)], epsilon = 1e-12);
            }
        }
        Ok(())
    }
}
