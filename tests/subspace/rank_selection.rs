//! Rank-selection tests on hand-built spectra and derivative matrices.

use ndarray::{arr1, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use subspace_uq::linalg::svd;
use subspace_uq::subspace::rank::{
    bing_li_criterion, constantine_criterion, energy_criterion, numerical_rank_check,
};
use subspace_uq::subspace::{BootstrapRngState, RankCriteria, RankSelectionEngine, SubspaceConfig};
use subspace_uq::SubspaceError;

use crate::test_helpers::init_logging;

fn random_derivatives(seed: u64, num_vars: usize, num_columns: usize) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((num_vars, num_columns), |_| rng.gen::<f64>() - 0.5)
}

/// Gradients of `(a . x)^2` at random points, every column a multiple of `a`,
/// plus isotropic noise of size 1e-6.
fn near_ridge_derivatives(direction: &[f64], num_samples: usize) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let a = arr1(direction);
    let mut d = Array2::zeros((a.len(), num_samples));
    for mut column in d.columns_mut() {
        let t: f64 = rng.gen_range(-2.0..2.0);
        let noise = Array1::from_shape_fn(a.len(), |_| 1e-6 * (rng.gen::<f64>() - 0.5));
        column.assign(&(&a * t + noise));
    }
    d
}

#[test]
fn test_energy_on_known_spectrum() {
    let spectrum = arr1(&[10.0, 1.0, 0.1]);
    assert_eq!(energy_criterion(&spectrum, 0.02), 1);
    assert_eq!(energy_criterion(&spectrum, 1e-3), 2);
    assert_eq!(energy_criterion(&spectrum, 1e-8), 3);

    // loosest tolerance keeps only the leading value
    assert_eq!(energy_criterion(&spectrum, 0.999), 1);
}

#[test]
fn test_numerical_rank_boundary() {
    let threshold = 10.0 * f64::EPSILON;

    // 1e-14 sits above the threshold: nothing changes
    let above = arr1(&[5.0, 3.0, 1e-14]);
    assert_eq!(numerical_rank_check(&above, threshold, 3).unwrap(), (3, false));

    // just below the threshold: the last direction is dropped
    let below = arr1(&[5.0, 3.0, 0.5 * threshold]);
    assert_eq!(numerical_rank_check(&below, threshold, 3).unwrap(), (2, true));
}

#[test]
fn test_engine_downgrades_user_rank() {
    init_logging();
    let d = Array2::from_diag(&arr1(&[5.0, 3.0, 1e-17]));
    let decomposition = svd(d.view()).unwrap();
    let config = SubspaceConfig {
        user_rank: Some(3),
        ..Default::default()
    };
    let engine = RankSelectionEngine::new(d.view(), 1, &decomposition, &config).unwrap();
    let selection = engine.select(&mut BootstrapRngState::new(Some(0))).unwrap();

    assert!(selection.user_rank_used);
    assert!(selection.numerically_downgraded);
    assert_eq!(selection.rank, 2);
}

#[test]
fn test_bootstrap_criteria_are_reproducible() {
    let d = random_derivatives(21, 4, 30);
    let decomposition = svd(d.view()).unwrap();

    let run_constantine = || {
        let mut rng = BootstrapRngState::new(Some(99));
        constantine_criterion(d.view(), 1, &decomposition, 25, &mut rng).unwrap()
    };
    let (rank_a, metric_a) = run_constantine();
    let (rank_b, metric_b) = run_constantine();
    assert_eq!(rank_a, rank_b);
    assert_eq!(metric_a, metric_b);
    assert_eq!(metric_a.len(), 3);

    let run_bing_li = || {
        let mut rng = BootstrapRngState::new(Some(99));
        bing_li_criterion(d.view(), 1, &decomposition, 25, &mut rng).unwrap()
    };
    assert_eq!(run_bing_li(), run_bing_li());
}

#[test]
fn test_block_structure_is_respected_with_two_responses() {
    // 2 responses per sample: 15 blocks of 2 columns
    let d = random_derivatives(22, 4, 30);
    let decomposition = svd(d.view()).unwrap();
    let mut rng = BootstrapRngState::new(Some(3));
    let (rank, metric) = constantine_criterion(d.view(), 2, &decomposition, 10, &mut rng).unwrap();
    assert!((1..=3).contains(&rank));
    assert!(metric.iter().all(|m| m.is_finite() && *m >= 0.0));

    // a matrix that is not a whole number of blocks is rejected
    let odd = random_derivatives(23, 4, 31);
    let decomposition = svd(odd.view()).unwrap();
    assert!(constantine_criterion(odd.view(), 2, &decomposition, 10, &mut rng).is_err());
}

#[test]
fn test_all_criteria_agree_on_a_ridge() {
    init_logging();
    let d = near_ridge_derivatives(&[0.5, 0.5, 0.5, 0.5], 40);
    let decomposition = svd(d.view()).unwrap();
    let config = SubspaceConfig {
        criteria: RankCriteria {
            energy: true,
            bing_li: true,
            constantine: true,
            cross_validation: false,
        },
        num_replicates: 30,
        ..Default::default()
    };
    let engine = RankSelectionEngine::new(d.view(), 1, &decomposition, &config).unwrap();
    let selection = engine.select(&mut BootstrapRngState::new(Some(1))).unwrap();

    assert_eq!(selection.energy, Some(1));
    assert_eq!(selection.bing_li, Some(1));
    assert_eq!(selection.constantine, Some(1));
    assert_eq!(selection.cross_validation, None);
    assert_eq!(selection.rank, 1);
}

#[test]
fn test_energy_abstaining_alone_is_fatal() {
    let d = Array2::<f64>::zeros((3, 6));
    let decomposition = svd(d.view()).unwrap();
    let config = SubspaceConfig {
        criteria: RankCriteria {
            energy: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = RankSelectionEngine::new(d.view(), 1, &decomposition, &config).unwrap();
    let result = engine.select(&mut BootstrapRngState::new(Some(0)));
    assert!(matches!(result, Err(SubspaceError::NumericalRankDeficient(_))));
}

#[test]
fn test_empty_spectrum_is_fatal() {
    let d = Array2::<f64>::zeros((3, 0));
    let decomposition = svd(d.view()).unwrap();
    let config = SubspaceConfig::default();
    assert!(matches!(
        RankSelectionEngine::new(d.view(), 1, &decomposition, &config),
        Err(SubspaceError::NoSingularValues)
    ));
}

#[test]
fn test_bing_li_abstaining_alone_is_fatal() {
    // one variable leaves Bing Li a single candidate, so it returns 0
    let d = Array2::from_shape_vec((1, 5), vec![1.0, -2.0, 0.5, 3.0, -1.5]).unwrap();
    let decomposition = svd(d.view()).unwrap();
    let mut rng = BootstrapRngState::new(Some(4));
    assert_eq!(bing_li_criterion(d.view(), 1, &decomposition, 10, &mut rng).unwrap(), 0);

    let config = SubspaceConfig {
        criteria: RankCriteria {
            bing_li: true,
            ..Default::default()
        },
        num_replicates: 10,
        ..Default::default()
    };
    let engine = RankSelectionEngine::new(d.view(), 1, &decomposition, &config).unwrap();
    let result = engine.select(&mut BootstrapRngState::new(Some(0)));
    assert!(matches!(result, Err(SubspaceError::NumericalRankDeficient(_))));
}
