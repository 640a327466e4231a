use crate::error::LinalgError;
use crate::matrix::Matrix;

/// LU factorization of a square matrix with scaled partial pivoting (Crout's method).
///
/// L and U share one packed matrix: U occupies the diagonal and above, L the
/// strict lower triangle with an implicit unit diagonal. Row `i` of the packed
/// matrix corresponds to row `permutation()[i]` of the input after the recorded
/// interchanges are replayed in order.
///
/// The decomposition is immutable once built; [`LUDecomposition::solve`] returns
/// a fresh vector.
#[derive(Debug, Clone)]
pub struct LUDecomposition {
    lu: Matrix,
    permutation: Vec<usize>,
    parity: f64,
}

impl LUDecomposition {
    /// Factorize a copy of `a`.
    ///
    /// # Errors
    ///
    /// - [`LinalgError::IllegalArgument`] if `a` is not square.
    /// - [`LinalgError::SingularMatrix`] if a row is entirely zero or a pivot is exactly zero.
    pub fn new(a: &Matrix) -> Result<Self, LinalgError> {
        Self::from_matrix(a.clone())
    }

    /// Factorize `a`, reusing its buffer as the packed LU storage.
    ///
    /// # Errors
    ///
    /// Same as [`LUDecomposition::new`].
    pub fn from_matrix(mut a: Matrix) -> Result<Self, LinalgError> {
        if !a.is_square() {
            return Err(LinalgError::not_square(a.rows(), a.cols()));
        }
        let n = a.rows();

        // implicit row scaling
        let mut scale = Vec::with_capacity(n);
        for i in 0..n {
            let big = a.row(i).iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            if big == 0.0 {
                return Err(LinalgError::SingularMatrix);
            }
            scale.push(1.0 / big);
        }

        let mut permutation = vec![0usize; n];
        let mut parity = 1.0;

        for j in 0..n {
            for i in 0..j {
                let mut sum = a[(i, j)];
                for k in 0..i {
                    sum -= a[(i, k)] * a[(k, j)];
                }
                a[(i, j)] = sum;
            }

            let mut big = 0.0;
            let mut imax = j;
            for i in j..n {
                let mut sum = a[(i, j)];
                for k in 0..j {
                    sum -= a[(i, k)] * a[(k, j)];
                }
                a[(i, j)] = sum;
                let candidate = scale[i] * sum.abs();
                if candidate >= big {
                    big = candidate;
                    imax = i;
                }
            }

            if imax != j {
                a.swap_rows(imax, j);
                parity = -parity;
                scale[imax] = scale[j];
            }
            permutation[j] = imax;

            let pivot = a[(j, j)];
            if pivot == 0.0 {
                return Err(LinalgError::SingularMatrix);
            }

            let inv = 1.0 / pivot;
            for i in (j + 1)..n {
                a[(i, j)] *= inv;
            }
        }

        Ok(Self {
            lu: a,
            permutation,
            parity,
        })
    }

    /// Dimension of the factorized matrix.
    pub fn dim(&self) -> usize {
        self.lu.rows()
    }

    /// The packed L/U matrix.
    pub fn packed(&self) -> &Matrix {
        &self.lu
    }

    /// Row interchange recorded at each elimination step.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Solve `A * x = b`, returning `x` in a fresh vector.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::IllegalArgument`] if `b.len()` differs from the dimension.
    pub fn solve(&self, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
        let n = self.dim();
        if b.len() != n {
            return Err(LinalgError::length_mismatch("right-hand side", n, b.len()));
        }

        let mut x = b.to_vec();

        // forward substitution, skipping the leading zeros of b
        let mut first_nonzero: Option<usize> = None;
        for i in 0..n {
            let ip = self.permutation[i];
            let mut sum = x[ip];
            x[ip] = x[i];
            if let Some(start) = first_nonzero {
                for j in start..i {
                    sum -= self.lu[(i, j)] * x[j];
                }
            } else if sum != 0.0 {
                first_nonzero = Some(i);
            }
            x[i] = sum;
        }

        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum -= self.lu[(i, j)] * x[j];
            }
            x[i] = sum / self.lu[(i, i)];
        }

        Ok(x)
    }

    /// Solve `A * X = B` column by column, returning `X` in fresh storage.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::IllegalArgument`] if `b` has a different number of rows.
    pub fn solve_matrix(&self, b: &Matrix) -> Result<Matrix, LinalgError> {
        let n = self.dim();
        if b.rows() != n {
            return Err(LinalgError::shape_mismatch(
                (n, b.cols()),
                (b.rows(), b.cols()),
            ));
        }
        let mut out = Matrix::zeros(n, b.cols());
        let mut column = vec![0.0; n];
        for j in 0..b.cols() {
            for (i, c) in column.iter_mut().enumerate() {
                *c = b[(i, j)];
            }
            let x = self.solve(&column)?;
            for (i, v) in x.into_iter().enumerate() {
                out[(i, j)] = v;
            }
        }
        Ok(out)
    }

    /// Determinant of the factorized matrix.
    pub fn determinant(&self) -> f64 {
        (0..self.dim()).fold(self.parity, |acc, i| acc * self.lu[(i, i)])
    }

    /// Inverse of the factorized matrix in fresh storage.
    pub fn inverse(&self) -> Result<Matrix, LinalgError> {
        self.solve_matrix(&Matrix::identity(self.dim()))
    }
}
