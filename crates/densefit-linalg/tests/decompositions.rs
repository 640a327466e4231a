use approx::assert_relative_eq;
use densefit_linalg::{LUDecomposition, LinalgError, Matrix, SingularValueDecomposition};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> Matrix {
    let data = (0..rows * cols)
        .map(|_| rng.random_range(-1.0..1.0))
        .collect();
    Matrix::from_shape_vec(rows, cols, data).unwrap()
}

/// Diagonally dominant, hence invertible and well conditioned.
fn random_invertible(rng: &mut StdRng, n: usize) -> Matrix {
    let mut a = random_matrix(rng, n, n);
    for i in 0..n {
        a[(i, i)] += n as f64;
    }
    a
}

#[test]
fn lu_solve_satisfies_system() -> Result<(), LinalgError> {
    let mut rng = StdRng::seed_from_u64(7);
    for n in [1, 2, 5, 10, 25] {
        let a = random_invertible(&mut rng, n);
        let b: Vec<f64> = (0..n).map(|_| rng.random_range(-10.0..10.0)).collect();

        let x = LUDecomposition::new(&a)?.solve(&b)?;
        let ax = a.multiply(&x)?;
        for (lhs, rhs) in ax.iter().zip(&b) {
            assert_relative_eq!(*lhs, *rhs, max_relative = 1e-9, epsilon = 1e-12);
        }
    }
    Ok(())
}

#[test]
fn svd_factors_are_orthonormal() -> Result<(), LinalgError> {
    let mut rng = StdRng::seed_from_u64(11);
    for (m, n) in [(1, 1), (3, 3), (6, 4), (20, 5), (8, 8)] {
        let a = random_matrix(&mut rng, m, n);
        let svd = SingularValueDecomposition::new(&a)?;

        let r = svd.reconstruct();
        for i in 0..m {
            for j in 0..n {
                assert_relative_eq!(r[(i, j)], a[(i, j)], epsilon = 1e-10);
            }
        }

        let utu = svd.u().transpose().matmul(svd.u())?;
        let vtv = svd.v().transpose().matmul(svd.v())?;
        for i in 0..n {
            for j in 0..n {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(utu[(i, j)], expected, epsilon = 1e-10);
                assert_relative_eq!(vtv[(i, j)], expected, epsilon = 1e-10);
            }
        }
        assert!(svd.w().iter().all(|&x| x >= 0.0));
    }
    Ok(())
}

#[test]
fn svd_solve_matches_lu_on_square_systems() -> Result<(), LinalgError> {
    let mut rng = StdRng::seed_from_u64(23);
    let a = random_invertible(&mut rng, 6);
    let b: Vec<f64> = (0..6).map(|_| rng.random_range(-1.0..1.0)).collect();

    let mut svd = SingularValueDecomposition::new(&a)?;
    assert_eq!(svd.clip_singular_values(1e-10), 0);
    let x_svd = svd.solve(&b)?;
    let x_lu = LUDecomposition::new(&a)?.solve(&b)?;

    for (s, l) in x_svd.iter().zip(&x_lu) {
        assert_relative_eq!(*s, *l, epsilon = 1e-10);
    }
    Ok(())
}

#[test]
fn clip_is_idempotent() -> Result<(), LinalgError> {
    let mut rng = StdRng::seed_from_u64(5);
    let a = random_matrix(&mut rng, 7, 4);
    let mut svd = SingularValueDecomposition::new(&a)?;

    svd.clip_singular_values(0.3);
    let once = svd.w().to_vec();
    svd.clip_singular_values(0.3);
    assert_eq!(svd.w(), once.as_slice());
    Ok(())
}

#[test]
fn gauss_jordan_agrees_with_lu_inverse() -> Result<(), LinalgError> {
    let mut rng = StdRng::seed_from_u64(3);
    let a = random_invertible(&mut rng, 5);

    let gj = a.inverse()?;
    let lu = LUDecomposition::new(&a)?.inverse()?;
    for i in 0..5 {
        for j in 0..5 {
            assert_relative_eq!(gj[(i, j)], lu[(i, j)], epsilon = 1e-12);
        }
    }
    Ok(())
}
