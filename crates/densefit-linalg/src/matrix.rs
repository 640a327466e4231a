use std::ops::{Index, IndexMut};

use crate::error::LinalgError;

/// A dense, row-major matrix of `f64` values with a fixed shape.
///
/// Operations that return a [`Matrix`] or a `Vec<f64>` allocate fresh storage.
/// [`Matrix::invert`] and the `*_mut` accessors mutate the receiver in place.
/// Cloning performs a deep copy, so clones never share storage.
///
/// Example:
///
/// ```
/// use densefit_linalg::Matrix;
///
/// let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
/// let y = a.multiply(&[1.0, 1.0]).unwrap();
/// assert_eq!(y, vec![3.0, 7.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Create a zero-filled matrix with the given shape.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Create the `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Wrap an existing row-major buffer.
    ///
    /// The matrix takes ownership of `data`; no copy is made.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::IllegalArgument`] if `data.len() != rows * cols`.
    pub fn from_shape_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, LinalgError> {
        if data.len() != rows * cols {
            return Err(LinalgError::length_mismatch(
                "matrix buffer",
                rows * cols,
                data.len(),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix from a slice of rows.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::IllegalArgument`] if the rows are ragged.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, LinalgError> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(LinalgError::IllegalArgument(format!(
                    "row {i} has {} columns, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Whether the matrix has as many rows as columns.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Get an element, or `None` if the index is out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Borrow a row as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Mutably borrow a row as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// The row-major backing buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The row-major backing buffer, mutably.
    pub fn as_slice_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consume the matrix and return its row-major buffer.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Return the transpose in fresh storage.
    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out[(j, i)] = self[(i, j)];
            }
        }
        out
    }

    /// Dense matrix-vector product `A * x`.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::IllegalArgument`] if `x.len()` differs from the column count.
    pub fn multiply(&self, x: &[f64]) -> Result<Vec<f64>, LinalgError> {
        if x.len() != self.cols {
            return Err(LinalgError::length_mismatch("vector", self.cols, x.len()));
        }
        Ok((0..self.rows)
            .map(|i| self.row(i).iter().zip(x).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// Dense matrix-matrix product `A * B`.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::IllegalArgument`] if the inner dimensions differ.
    pub fn matmul(&self, other: &Matrix) -> Result<Matrix, LinalgError> {
        if self.cols != other.rows {
            return Err(LinalgError::IllegalArgument(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(i, k)];
                if a == 0.0 {
                    continue;
                }
                for (o, b) in out.row_mut(i).iter_mut().zip(other.row(k)) {
                    *o += a * b;
                }
            }
        }
        Ok(out)
    }

    /// Swap two rows in place.
    pub(crate) fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for j in 0..self.cols {
            self.data.swap(a * self.cols + j, b * self.cols + j);
        }
    }

    fn swap_cols(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for i in 0..self.rows {
            self.data.swap(i * self.cols + a, i * self.cols + b);
        }
    }

    /// Invert the matrix in place by Gauss-Jordan elimination with full pivoting.
    ///
    /// On return `self` holds `A^-1` and `rhs` holds `A^-1 * B`, where `B` is the
    /// original right-hand side. `rhs` may have any number of columns, including zero.
    ///
    /// # Errors
    ///
    /// - [`LinalgError::IllegalArgument`] if the matrix is not square or `rhs` has a
    ///   different number of rows.
    /// - [`LinalgError::IllegalArgument`] if the matrix holds a NaN or infinite element.
    /// - [`LinalgError::SingularMatrix`] if a pivot is exactly zero or the elimination
    ///   overflows. The contents of both matrices are unspecified in that case.
    pub fn invert(&mut self, rhs: &mut Matrix) -> Result<(), LinalgError> {
        if !self.is_square() {
            return Err(LinalgError::not_square(self.rows, self.cols));
        }
        if rhs.rows != self.rows {
            return Err(LinalgError::shape_mismatch(
                (self.rows, rhs.cols),
                (rhs.rows, rhs.cols),
            ));
        }

        if let Some(pos) = self.data.iter().position(|v| !v.is_finite()) {
            return Err(LinalgError::IllegalArgument(format!(
                "non-finite element at ({}, {})",
                pos / self.cols,
                pos % self.cols
            )));
        }

        let n = self.rows;
        let mut used = vec![false; n];
        let mut pivot_rows = vec![0usize; n];
        let mut pivot_cols = vec![0usize; n];

        for step in 0..n {
            // largest remaining element over the unused rows and columns
            let mut big = 0.0;
            let mut pivot_at = None;
            for j in (0..n).filter(|&j| !used[j]) {
                for k in (0..n).filter(|&k| !used[k]) {
                    let candidate = self[(j, k)].abs();
                    if !candidate.is_finite() {
                        return Err(LinalgError::SingularMatrix);
                    }
                    if candidate >= big {
                        big = candidate;
                        pivot_at = Some((j, k));
                    }
                }
            }
            let Some((irow, icol)) = pivot_at else {
                return Err(LinalgError::SingularMatrix);
            };
            used[icol] = true;

            // move the pivot onto the diagonal
            if irow != icol {
                self.swap_rows(irow, icol);
                rhs.swap_rows(irow, icol);
            }
            pivot_rows[step] = irow;
            pivot_cols[step] = icol;

            let pivot = self[(icol, icol)];
            if pivot == 0.0 {
                return Err(LinalgError::SingularMatrix);
            }

            let pivinv = 1.0 / pivot;
            self[(icol, icol)] = 1.0;
            self.row_mut(icol).iter_mut().for_each(|v| *v *= pivinv);
            rhs.row_mut(icol).iter_mut().for_each(|v| *v *= pivinv);

            for ll in (0..n).filter(|&ll| ll != icol) {
                let factor = self[(ll, icol)];
                if factor == 0.0 {
                    continue;
                }
                self[(ll, icol)] = 0.0;
                for j in 0..n {
                    let v = self[(icol, j)];
                    self[(ll, j)] -= v * factor;
                }
                for j in 0..rhs.cols {
                    let v = rhs[(icol, j)];
                    rhs[(ll, j)] -= v * factor;
                }
            }
        }

        // undo the column interchanges in reverse order
        for step in (0..n).rev() {
            self.swap_cols(pivot_rows[step], pivot_cols[step]);
        }

        Ok(())
    }

    /// Return the inverse in fresh storage, leaving `self` untouched.
    ///
    /// # Errors
    ///
    /// Same as [`Matrix::invert`].
    pub fn inverse(&self) -> Result<Matrix, LinalgError> {
        let mut inv = self.clone();
        let mut rhs = Matrix::zeros(self.rows, 0);
        inv.invert(&mut rhs)?;
        Ok(inv)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        debug_assert!(row < self.rows && col < self.cols);
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        debug_assert!(row < self.rows && col < self.cols);
        &mut self.data[row * self.cols + col]
    }
}
