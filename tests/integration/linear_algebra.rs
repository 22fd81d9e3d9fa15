use approx::assert_relative_eq;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use subspace_uq::linalg::{
    frobenius_norm, numerical_rank_threshold, orthonormalize_rows, qr_orthonormal_columns, svd,
    symmetric_eigen,
};

use crate::test_helpers::{has_orthonormal_columns, matrix_approx_eq};

// Helper function to create random matrices
fn create_random_matrix(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |_| rng.gen::<f64>() - 0.5)
}

// ======== SVD property tests ========

#[test]
fn property_svd_reconstructs_input() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..10 {
        let rows = rng.gen_range(1..8);
        let cols = rng.gen_range(1..12);
        let a = create_random_matrix(&mut rng, rows, cols);

        let result = svd(a.view()).unwrap();
        let k = result.singular_values.len();
        assert_eq!(k, rows.min(cols));

        // U_k diag(s) V^T
        let u_k = result.left_singular_vectors.slice(ndarray::s![.., ..k]).to_owned();
        let scaled = &u_k * &result.singular_values;
        let rebuilt = scaled.dot(&result.right_singular_vectors_t);
        assert!(matrix_approx_eq(&rebuilt, &a, 1e-10));
    }
}

#[test]
fn property_svd_left_basis_is_complete_and_orthogonal() {
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    for cols in [1, 2, 5] {
        let a = create_random_matrix(&mut rng, 5, cols);
        let result = svd(a.view()).unwrap();

        // full 5x5 basis even when there are fewer columns than rows
        assert_eq!(result.left_singular_vectors.dim(), (5, 5));
        assert!(has_orthonormal_columns(result.left_singular_vectors.view(), 1e-10));
    }
}

#[test]
fn property_singular_values_descend() {
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    for _ in 0..10 {
        let a = create_random_matrix(&mut rng, 6, 9);
        let values = svd(a.view()).unwrap().singular_values;
        for pair in values.as_slice().unwrap().windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        // sum of squares equals the squared Frobenius norm
        let energy: f64 = values.iter().map(|s| s * s).sum();
        assert_relative_eq!(energy, frobenius_norm(a.view()).powi(2), epsilon = 1e-10);
    }
}

#[test]
fn test_svd_of_empty_matrix() {
    let a = Array2::<f64>::zeros((3, 0));
    let result = svd(a.view()).unwrap();
    assert_eq!(result.singular_values.len(), 0);
    assert_eq!(result.left_singular_vectors, Array2::<f64>::eye(3));
}

#[test]
fn test_rank_deficient_matrix_has_tiny_trailing_values() {
    // two identical rows
    let a = ndarray::arr2(&[[1.0, 2.0, 3.0], [1.0, 2.0, 3.0], [0.0, 1.0, 0.0]]);
    let result = svd(a.view()).unwrap();
    assert!(result.singular_values[2] < 1e-12);
    assert!(numerical_rank_threshold(a.view()) > 0.0);
    assert!(result.singular_values[1] > 0.1);
}

// ======== Orthogonalization tests ========

#[test]
fn property_qr_keeps_the_flag_of_leading_columns() {
    let mut rng = ChaCha8Rng::seed_from_u64(14);
    let a = create_random_matrix(&mut rng, 4, 4);
    let q = qr_orthonormal_columns(a.view()).unwrap();
    assert!(has_orthonormal_columns(q.view(), 1e-12));

    // the first column of Q is the normalized first column of A
    let first = a.column(0).to_owned();
    let norm = first.dot(&first).sqrt();
    for i in 0..4 {
        assert_relative_eq!(q[[i, 0]], first[i] / norm, epsilon = 1e-12);
    }
}

#[test]
fn test_row_orthonormalization_skips_dependent_rows() {
    let rows = ndarray::arr2(&[
        [1.0, 1.0, 0.0],
        [2.0, 2.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 3.0],
    ]);
    let basis = orthonormalize_rows(rows.view(), 1e-10, 3);
    assert_eq!(basis.nrows(), 3);
    assert!(has_orthonormal_columns(basis.t(), 1e-12));
}

#[test]
fn test_symmetric_eigen_orders_values() {
    let m = ndarray::arr2(&[[2.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 1.0]]);
    let (values, vectors) = symmetric_eigen(m.view()).unwrap();
    assert_relative_eq!(values[0], 5.0, epsilon = 1e-12);
    assert_relative_eq!(values[2], 1.0, epsilon = 1e-12);
    assert_relative_eq!(vectors[[1, 0]].abs(), 1.0, epsilon = 1e-12);
}
