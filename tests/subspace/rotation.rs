//! Rotation-model tests: forward map, projections and distribution transform.

use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::{arr1, arr2, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use subspace_uq::linalg::qr_orthonormal_columns;
use subspace_uq::subspace::{CoordinateFrame, SubspaceRotationModel};
use subspace_uq::{Marginal, SubspaceError, UncertainVariables};

use crate::test_helpers::{array_approx_eq, has_orthonormal_columns};

fn random_orthogonal(rng: &mut ChaCha8Rng, n: usize) -> Array2<f64> {
    let a = Array2::from_shape_fn((n, n), |_| rng.gen::<f64>() - 0.5);
    qr_orthonormal_columns(a.view()).unwrap()
}

fn random_point(rng: &mut ChaCha8Rng, n: usize) -> Array1<f64> {
    Array1::from_shape_fn(n, |_| rng.gen_range(-3.0..3.0))
}

#[test]
fn test_forward_map_is_linear_without_inactive_offset() {
    let mut rng = ChaCha8Rng::seed_from_u64(31);
    let rotation = random_orthogonal(&mut rng, 4);
    let variables = UncertainVariables::standard_normals(4).unwrap();
    let model = SubspaceRotationModel::new(rotation, 2, &variables, CoordinateFrame::Physical).unwrap();

    assert!(array_approx_eq(model.inactive_value(), &Array1::zeros(2), 1e-14));
    assert!(has_orthonormal_columns(model.active_basis(), 1e-12));

    for _ in 0..5 {
        let y1 = random_point(&mut rng, 2);
        let y2 = random_point(&mut rng, 2);
        let sum = &y1 + &y2;
        let residual = model.forward(y1.view()).unwrap() + model.forward(y2.view()).unwrap()
            - model.forward(sum.view()).unwrap();
        assert!(array_approx_eq(&residual, &Array1::zeros(4), 1e-12));
    }
}

#[test]
fn test_projection_inverts_forward_map() {
    let mut rng = ChaCha8Rng::seed_from_u64(32);
    let rotation = random_orthogonal(&mut rng, 5);
    let variables =
        UncertainVariables::independent_normals(&[1.0, -2.0, 0.5, 3.0, 0.0], &[1.0, 2.0, 0.5, 1.0, 3.0])
            .unwrap();

    for frame in [CoordinateFrame::Physical, CoordinateFrame::Standardized] {
        let model = SubspaceRotationModel::new(rotation.clone(), 3, &variables, frame).unwrap();
        let y = random_point(&mut rng, 3);
        let x = model.forward(y.view()).unwrap();
        let back = model.to_reduced(x.view()).unwrap();
        assert!(array_approx_eq(&back, &y, 1e-10));
    }
}

#[test]
fn test_reduced_distribution_matches_covariance_transform() {
    let mut rng = ChaCha8Rng::seed_from_u64(33);
    let rotation = random_orthogonal(&mut rng, 3);
    let correlation = arr2(&[[1.0, 0.3, 0.0], [0.3, 1.0, -0.2], [0.0, -0.2, 1.0]]);
    let variables = UncertainVariables::independent_normals(&[1.0, 2.0, 3.0], &[0.5, 1.0, 2.0])
        .unwrap()
        .with_correlation(correlation)
        .unwrap();
    let model =
        SubspaceRotationModel::new(rotation.clone(), 2, &variables, CoordinateFrame::Physical).unwrap();

    let active = model.active_basis();
    let expected_mean = active.t().dot(&variables.means());
    let expected_cov = active.t().dot(&variables.covariance()).dot(&active);

    let reduced = model.reduced_distribution();
    for i in 0..2 {
        assert_relative_eq!(reduced.means[i], expected_mean[i], epsilon = 1e-12);
        assert_relative_eq!(reduced.std_devs[i], expected_cov[[i, i]].sqrt(), epsilon = 1e-12);
    }
    let corr = reduced.correlation_matrix();
    assert_relative_eq!(corr[[0, 0]], 1.0);
    assert_relative_eq!(
        corr[[0, 1]],
        expected_cov[[0, 1]] / (reduced.std_devs[0] * reduced.std_devs[1]),
        epsilon = 1e-12
    );
    assert_relative_eq!(corr[[0, 1]], corr[[1, 0]], epsilon = 1e-14);
}

#[test]
fn test_uniform_variables_are_rejected() {
    let variables = UncertainVariables::new(vec![Marginal::normal(0.0, 1.0), Marginal::uniform(-1.0, 1.0)]).unwrap();
    let result = SubspaceRotationModel::new(Array2::eye(2), 1, &variables, CoordinateFrame::Physical);
    assert!(matches!(result, Err(SubspaceError::UnsupportedDistribution(_))));
}

#[test]
fn test_chain_rule_matches_finite_differences() {
    let mut rng = ChaCha8Rng::seed_from_u64(34);
    let rotation = random_orthogonal(&mut rng, 3);
    let variables = UncertainVariables::independent_normals(&[0.5, 1.0, -1.0], &[2.0, 1.0, 0.5]).unwrap();
    let model = Arc::new(
        SubspaceRotationModel::new(rotation, 2, &variables, CoordinateFrame::Standardized).unwrap(),
    );
    let transform = SubspaceRotationModel::variable_transform(&model);

    // g(x) = x0 * x1 + x2^2
    let g = |x: &Array1<f64>| x[0] * x[1] + x[2] * x[2];
    let grad = |x: &Array1<f64>| arr2(&[[x[1]], [x[0]], [2.0 * x[2]]]);

    let y = arr1(&[0.3, -0.7]);
    let x = transform(y.view()).unwrap();
    let reduced_grad = model.transform_gradients(grad(&x).view()).unwrap();

    let h = 1e-6;
    for i in 0..2 {
        let mut plus = y.clone();
        let mut minus = y.clone();
        plus[i] += h;
        minus[i] -= h;
        let fd = (g(&transform(plus.view()).unwrap()) - g(&transform(minus.view()).unwrap())) / (2.0 * h);
        assert_relative_eq!(reduced_grad[[i, 0]], fd, epsilon = 1e-6);
    }
}

#[test]
fn test_transforms_share_one_model() {
    let variables = UncertainVariables::standard_normals(2).unwrap();
    let model = Arc::new(
        SubspaceRotationModel::new(Array2::eye(2), 1, &variables, CoordinateFrame::Physical).unwrap(),
    );
    let first = SubspaceRotationModel::variable_transform(&model);
    let second = SubspaceRotationModel::variable_transform(&model);
    assert_eq!(Arc::strong_count(&model), 3);
    assert_eq!(first(arr1(&[2.0]).view()).unwrap(), second(arr1(&[2.0]).view()).unwrap());
}
