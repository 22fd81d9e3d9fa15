//! End-to-end active subspace builds.

use approx::assert_relative_eq;
use ndarray::{arr1, Array1};
use subspace_uq::model::{ActiveSet, FullSpaceModel};
use subspace_uq::sampling::MonteCarloSampler;
use subspace_uq::subspace::{
    ActiveSubspaceConstructor, BasisConstructor, CvMetric, Normalization, RankCriteria,
    SubspaceBuild,
};
use subspace_uq::surrogate::SurrogateFitter;
use subspace_uq::{SubspaceBuilder, SubspaceConfig, SubspaceError, UncertainVariables};

use crate::test_helpers::{init_logging, perturbed_ridge_model, ridge_model, scaled_pair_model};

fn run_build(
    model: &dyn FullSpaceModel,
    variables: UncertainVariables,
    config: SubspaceConfig,
) -> subspace_uq::Result<SubspaceBuild> {
    let sampler = MonteCarloSampler::new(variables.clone(), config.initial_samples, config.seed)?;
    let mut constructor = ActiveSubspaceConstructor::new(sampler, model.num_functions(), &config);
    SubspaceBuilder::new(config, variables)?.build(model, &mut constructor)
}

#[test]
fn test_ridge_build_and_reduced_model() {
    init_logging();
    let direction = [0.6, 0.0, 0.8, 0.0];
    let model = perturbed_ridge_model(&direction, 1e-6);
    let variables = UncertainVariables::standard_normals(4).unwrap();
    let config = SubspaceConfig {
        initial_samples: 50,
        num_replicates: 40,
        ..Default::default()
    };
    let build = run_build(&model, variables, config).unwrap();

    assert_eq!(build.rotation().rank(), 1);
    let statistics = build.statistics();
    assert_eq!(statistics.method, "active_subspace");
    assert_eq!(statistics.total_samples, 50);
    assert_eq!(statistics.singular_values.len(), 4);
    let selection = statistics.rank_selection.as_ref().unwrap();
    // no criterion enabled: Constantine runs alone
    assert_eq!(selection.constantine, Some(1));
    assert!(selection.energy.is_none());

    let lead = build.rotation().active_basis();
    let alignment = lead.column(0).dot(&arr1(&direction)).abs();
    assert_relative_eq!(alignment, 1.0, epsilon = 1e-8);

    // the reduced model is (+/-y)^2 since the inactive offset is zero
    let reduced = build.reduced_model(ridge_model(&direction)).unwrap();
    assert_eq!(reduced.num_variables(), 1);
    let response = reduced
        .evaluate(&arr1(&[1.5]), ActiveSet::VALUES | ActiveSet::GRADIENTS)
        .unwrap();
    assert_relative_eq!(response.values().unwrap()[0], 2.25, epsilon = 1e-6);
    assert_relative_eq!(response.gradients().unwrap()[[0, 0]].abs(), 3.0, epsilon = 1e-6);
}

#[test]
fn test_builds_are_reproducible_under_a_fixed_seed() {
    let model = ridge_model(&[1.0, 1.0, 0.0]);
    let config = SubspaceConfig {
        initial_samples: 30,
        seed: Some(17),
        criteria: RankCriteria {
            bing_li: true,
            constantine: true,
            ..Default::default()
        },
        num_replicates: 20,
        ..Default::default()
    };
    let variables = UncertainVariables::standard_normals(3).unwrap();
    let first = run_build(&model, variables.clone(), config.clone()).unwrap();
    let second = run_build(&model, variables, config).unwrap();

    assert_eq!(first.statistics().singular_values, second.statistics().singular_values);
    assert_eq!(first.statistics().rank_selection, second.statistics().rank_selection);
    assert_eq!(first.rotation().rotation(), second.rotation().rotation());
}

#[test]
fn test_gradient_normalization_balances_responses() {
    let model = scaled_pair_model(3, 1000.0, 1.0);
    let energy_only = RankCriteria {
        energy: true,
        ..Default::default()
    };
    let config = SubspaceConfig {
        initial_samples: 20,
        criteria: energy_only,
        truncation_tolerance: 1e-3,
        ..Default::default()
    };
    let variables = UncertainVariables::standard_normals(3).unwrap();

    // the second response is invisible next to the first
    let raw = run_build(&model, variables.clone(), config.clone()).unwrap();
    assert_eq!(raw.rotation().rank(), 1);

    let normalized = SubspaceConfig {
        normalization: Normalization::MeanGradient,
        ..config
    };
    let balanced = run_build(&model, variables, normalized).unwrap();
    assert_eq!(balanced.rotation().rank(), 2);
}

#[test]
fn test_refinement_grows_the_sample_set() {
    let model = ridge_model(&[1.0, 0.0, 0.0]);
    let config = SubspaceConfig {
        initial_samples: 10,
        refinement_iterations: 2,
        refinement_samples: vec![4, 6],
        user_rank: Some(1),
        ..Default::default()
    };
    let build = run_build(&model, UncertainVariables::standard_normals(3).unwrap(), config).unwrap();
    assert_eq!(build.statistics().total_samples, 20);
    assert!(build.statistics().rank_selection.as_ref().unwrap().user_rank_used);
}

#[test]
fn test_cross_validated_build_with_surrogate() {
    init_logging();
    let direction = [1.0 / 2f64.sqrt(), 1.0 / 2f64.sqrt(), 0.0, 0.0];
    let model = ridge_model(&direction);
    let config = SubspaceConfig {
        initial_samples: 60,
        criteria: RankCriteria {
            cross_validation: true,
            ..Default::default()
        },
        cv_folds: 5,
        cv_metric: CvMetric::Relative,
        cv_relative_tolerance: 1e-6,
        cv_incremental: true,
        build_surrogate: true,
        ..Default::default()
    };
    let build = run_build(&model, UncertainVariables::standard_normals(4).unwrap(), config).unwrap();

    assert_eq!(build.rotation().rank(), 1);
    let selection = build.statistics().rank_selection.as_ref().unwrap();
    assert_eq!(selection.cross_validation, Some(1));
    assert_eq!(selection.cv_errors.len(), 1);

    // enough samples were drawn already; no refinement was needed
    assert_eq!(build.statistics().surrogate_refinement_samples, 0);
    let surrogate = build.surrogate().unwrap();
    assert_eq!(surrogate.num_points(), 60);
    let prediction = surrogate.evaluate(Array1::from(vec![0.5]).view()).unwrap();
    assert_relative_eq!(prediction[0], 0.25, epsilon = 1e-8);
}

#[test]
fn test_uniform_variables_fail_at_the_rotation() {
    let variables = UncertainVariables::new(vec![
        subspace_uq::Marginal::uniform(-1.0, 1.0),
        subspace_uq::Marginal::uniform(-1.0, 1.0),
    ])
    .unwrap();
    let model = ridge_model(&[1.0, 0.0]);
    let config = SubspaceConfig {
        initial_samples: 20,
        user_rank: Some(1),
        ..Default::default()
    };
    let result = run_build(&model, variables, config);
    assert!(matches!(result, Err(SubspaceError::UnsupportedDistribution(_))));
}

#[test]
fn test_invalid_configuration_is_rejected_before_sampling() {
    let config = SubspaceConfig {
        initial_samples: 1,
        ..Default::default()
    };
    let variables = UncertainVariables::standard_normals(2).unwrap();
    assert!(matches!(
        SubspaceBuilder::new(config, variables),
        Err(SubspaceError::Configuration(_))
    ));
}

#[test]
fn test_user_rank_beyond_full_space_is_fatal() {
    let model = ridge_model(&[1.0, 0.0, 0.0]);
    let variables = UncertainVariables::standard_normals(3).unwrap();
    let config = SubspaceConfig {
        initial_samples: 10,
        user_rank: Some(7),
        ..Default::default()
    };
    assert!(matches!(
        run_build(&model, variables.clone(), config.clone()),
        Err(SubspaceError::Configuration(_))
    ));

    // constructors check the rank on their own too
    let sampler = MonteCarloSampler::new(variables.clone(), 10, Some(0)).unwrap();
    let mut constructor = ActiveSubspaceConstructor::new(sampler, 1, &config);
    assert!(matches!(
        constructor.construct(&model, &variables, &config),
        Err(SubspaceError::Configuration(_))
    ));
}
