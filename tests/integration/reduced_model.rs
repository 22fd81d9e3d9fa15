//! Reduced-model tests that exercise sampling, building and evaluation together.

use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::{arr1, arr2, Array2};
use subspace_uq::model::{ActiveSet, ClosureModel, FullSpaceModel};
use subspace_uq::sampling::{DaceSampler, MonteCarloSampler};
use subspace_uq::subspace::{CoordinateFrame, SubspaceRotationModel};
use subspace_uq::{ReducedModel, SubspaceError, UncertainVariables};

fn quadratic_model() -> ClosureModel {
    // f(x) = x0^2 + x0 x1 + 2 x1, with exact gradient and Hessian
    ClosureModel::new(2, 1, |x| arr1(&[x[0] * x[0] + x[0] * x[1] + 2.0 * x[1]]))
        .with_gradients(|x| arr2(&[[2.0 * x[0] + x[1]], [x[0] + 2.0]]))
        .with_hessians(|_| vec![arr2(&[[2.0, 1.0], [1.0, 0.0]])])
}

fn rotated(frame: CoordinateFrame) -> Arc<SubspaceRotationModel> {
    let s = 1.0 / 2f64.sqrt();
    let rotation = arr2(&[[s, -s], [s, s]]);
    let variables = UncertainVariables::independent_normals(&[1.0, 1.0], &[1.0, 2.0]).unwrap();
    Arc::new(SubspaceRotationModel::new(rotation, 1, &variables, frame).unwrap())
}

#[test]
fn test_reduced_model_is_sampled_like_any_model() {
    let reduced = ReducedModel::with_rotation(quadratic_model(), rotated(CoordinateFrame::Physical)).unwrap();
    let reduced_vars = UncertainVariables::standard_normals(reduced.num_variables()).unwrap();
    let mut sampler = MonteCarloSampler::new(reduced_vars, 8, Some(3)).unwrap();
    let batch = sampler
        .run(&reduced, ActiveSet::VALUES | ActiveSet::GRADIENTS)
        .unwrap();

    assert_eq!(batch.len(), 8);
    for (j, response) in &batch.responses {
        let y = batch.samples.column(*j).to_owned();
        let x = reduced.to_full(&y).unwrap();
        let expected = quadratic_model().evaluate(&x, ActiveSet::VALUES).unwrap();
        assert_relative_eq!(response.values().unwrap()[0], expected.values().unwrap()[0], epsilon = 1e-12);
        assert_eq!(response.gradients().unwrap().dim(), (1, 1));
    }
}

#[test]
fn test_hessians_follow_the_congruence_transform() {
    for frame in [CoordinateFrame::Physical, CoordinateFrame::Standardized] {
        let rotation = rotated(frame);
        let reduced = ReducedModel::with_rotation(quadratic_model(), Arc::clone(&rotation)).unwrap();
        let response = reduced.evaluate(&arr1(&[0.25]), ActiveSet::HESSIANS).unwrap();

        // J = diag(scale) A with the scale implied by the frame
        let scale = match frame {
            CoordinateFrame::Physical => arr1(&[1.0, 1.0]),
            CoordinateFrame::Standardized => arr1(&[1.0, 2.0]),
        };
        let mut jacobian = rotation.active_basis().to_owned();
        for (mut row, s) in jacobian.rows_mut().into_iter().zip(scale.iter()) {
            row *= *s;
        }
        let hessian = arr2(&[[2.0, 1.0], [1.0, 0.0]]);
        let expected: Array2<f64> = jacobian.t().dot(&hessian).dot(&jacobian);
        assert_relative_eq!(response.hessians().unwrap()[0][[0, 0]], expected[[0, 0]], epsilon = 1e-12);
    }
}

#[test]
fn test_late_initialization() {
    let mut reduced = ReducedModel::new(quadratic_model());
    assert!(matches!(reduced.rotation(), Err(SubspaceError::Uninitialized(_))));
    assert!(reduced.to_full(&arr1(&[0.0])).is_err());

    reduced.initialize(rotated(CoordinateFrame::Physical)).unwrap();
    assert!(reduced.is_initialized());
    let x = reduced.to_full(&arr1(&[0.0])).unwrap();
    // at y = 0 only the frozen inactive component remains: (1, 1) lies on the
    // active direction, so x collapses to the origin
    assert_relative_eq!(x[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(x[1], 0.0, epsilon = 1e-12);
}
