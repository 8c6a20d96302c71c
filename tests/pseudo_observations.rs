use approx::assert_abs_diff_eq;
use pseudostate::aalen_johansen::{
    AalenJohansenBuilder, AalenJohansenEstimator, CUMULATIVE_HAZARD_COLUMN, STATE_OCCUPANCY_COLUMN,
};
use pseudostate::engine::{BlockValues, PseudoError};
use pseudostate::estimate::{EventTableBuilder, Estimator, IdentifierValue};
use pseudostate::progress::Pass;
use pseudostate::{Sample, aalen_johansen_engine, calculate_pseudostates};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn five() -> Sample {
    Sample::new(vec![10.0, 20.0, 30.0, 40.0, 50.0], vec![1, 2, 1, 3, 2]).unwrap()
}

fn random_sample(rng: &mut StdRng, n: usize, censoring: bool) -> Sample {
    let times = (0..n).map(|_| rng.gen_range(0.0..100.0_f64).round()).collect();
    let low = if censoring { 0 } else { 1 };
    let states = (0..n).map(|_| rng.gen_range(low..=3u32)).collect();
    Sample::new(times, states).unwrap()
}

#[test]
fn five_individual_scenario() {
    let sample = five();
    let table = calculate_pseudostates(&sample, 35.0).unwrap();

    assert_eq!(table.n_blocks(), 5);
    assert_eq!(table.block_keys().len(), 4);
    assert_eq!(table.len(), 20);
    assert_eq!(table.row_index_column(), "row_id");

    let states: Vec<i64> = table
        .block_keys()
        .iter()
        .map(|k| match &k.values()[1] {
            IdentifierValue::Integer(s) => *s,
            other => panic!("unexpected state identifier {other:?}"),
        })
        .collect();
    assert_eq!(states, vec![0, 1, 2, 3]);
    for key in table.block_keys() {
        assert_eq!(key.values()[2], IdentifierValue::Real(35.0));
    }

    let ids: Vec<usize> = table.blocks().map(|b| b.excluded).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    for id in 0..5 {
        assert_eq!(table.row_ids().filter(|&r| r == id).count(), 4);
    }

    // Without censoring each pseudo-observation is the indicator of the
    // individual's state at the horizon.
    let expected = [
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [1.0, 0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0, 0.0],
    ];
    for (block, row) in table.blocks().zip(expected) {
        for (s, &want) in row.iter().enumerate() {
            assert_abs_diff_eq!(block.values[[s, 0]], want, epsilon = 1e-12);
        }
    }
}

#[test]
fn identifiers_come_from_full_estimate_in_every_block() {
    let sample = five();
    let engine = aalen_johansen_engine(&sample, 0);
    let full = engine.estimate(&sample, 35.0, Pass::Full).unwrap();
    let table = engine.compute(&sample, 35.0).unwrap();
    for block in table.blocks() {
        assert_eq!(block.keys, full.keys());
    }
    for row in 0..table.len() {
        assert_eq!(table.key(row), Some(&full.keys()[row % full.n_rows()]));
    }
    assert_eq!(table.key(table.len()), None);
}

#[test]
fn mean_reconstructs_full_estimate_without_censoring() {
    let mut rng = StdRng::seed_from_u64(17);
    for n in [2, 3, 7, 25] {
        let sample = random_sample(&mut rng, n, false);
        let horizon = sample.max_time().unwrap() * 0.6;
        let engine = aalen_johansen_engine(&sample, 0);
        let full = engine.estimate(&sample, horizon, Pass::Full).unwrap();
        let table = engine.compute(&sample, horizon).unwrap();
        assert_eq!(table.len(), n * full.n_rows());

        let means = table.mean_by_key().unwrap();
        for key in full.keys() {
            assert_abs_diff_eq!(
                means.value(key, STATE_OCCUPANCY_COLUMN).unwrap(),
                full.value(key, STATE_OCCUPANCY_COLUMN).unwrap(),
                epsilon = 1e-9
            );
        }
    }
}

#[test]
fn occupancy_pseudo_observations_sum_to_one_per_block() {
    let mut rng = StdRng::seed_from_u64(5);
    let sample = random_sample(&mut rng, 30, true);
    let horizon = sample.max_time().unwrap() / 2.0;
    let table = calculate_pseudostates(&sample, horizon).unwrap();
    for block in table.blocks() {
        let total: f64 = block.values.column(0).sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
    }
    assert!(table.column(CUMULATIVE_HAZARD_COLUMN).is_some());
}

#[test]
fn pseudo_values_follow_the_jackknife_formula() {
    let mut rng = StdRng::seed_from_u64(99);
    let sample = random_sample(&mut rng, 12, true);
    let horizon = sample.max_time().unwrap() * 0.75;
    let engine = aalen_johansen_engine(&sample, 0);
    let full = engine.estimate(&sample, horizon, Pass::Full).unwrap();
    let pseudo = engine.compute(&sample, horizon).unwrap();
    let raw = engine.leave_one_out_estimates(&sample, horizon).unwrap();
    assert_eq!(pseudo.kind(), BlockValues::PseudoObservation);
    assert_eq!(raw.kind(), BlockValues::LeaveOneOutEstimate);

    let n = sample.len() as f64;
    for (p, l) in pseudo.blocks().zip(raw.blocks()) {
        assert_eq!(p.excluded, l.excluded);
        for ((&pv, &lv), &fv) in p
            .values
            .iter()
            .zip(l.values.iter())
            .zip(full.values().iter())
        {
            assert_abs_diff_eq!(pv, n * fv - (n - 1.0) * lv, epsilon = 1e-9);
        }
    }
}

#[test]
fn subsamples_match_independently_built_samples() {
    let sample = five();
    let builder = AalenJohansenBuilder::for_sample(&sample, 0);
    let estimator = AalenJohansenEstimator::for_sample(&sample);
    let evaluate = |s: &Sample| {
        estimator
            .evaluate(&builder.build_event_table(s).unwrap(), &[35.0])
            .unwrap()
    };

    assert_eq!(evaluate(&sample), evaluate(&five()));
    let rebuilt =
        Sample::new(vec![10.0, 20.0, 40.0, 50.0], vec![1, 2, 3, 2]).unwrap();
    assert_eq!(evaluate(&sample.without(2).unwrap()), evaluate(&rebuilt));
}

#[test]
fn two_individuals_give_two_blocks() {
    let sample = Sample::new(vec![4.0, 9.0], vec![1, 0]).unwrap();
    let table = calculate_pseudostates(&sample, 5.0).unwrap();
    assert_eq!(table.n_blocks(), 2);
    assert_eq!(table.len(), 4);
    let occupancy = table.column(STATE_OCCUPANCY_COLUMN).unwrap();
    assert_abs_diff_eq!(occupancy[0], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(occupancy[1], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(occupancy[2], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(occupancy[3], 0.0, epsilon = 1e-12);
}

#[test]
fn single_individual_is_rejected() {
    let sample = Sample::new(vec![4.0], vec![1]).unwrap();
    assert!(matches!(
        calculate_pseudostates(&sample, 1.0),
        Err(PseudoError::SampleTooSmall { found: 1 })
    ));
}

#[test]
fn horizon_outside_follow_up_fails_before_leave_one_out() {
    for horizon in [-1.0, 60.0] {
        let err = calculate_pseudostates(&five(), horizon).unwrap_err();
        assert!(err.is_invalid_horizon(), "got {err}");
        assert_eq!(err.pass(), Some(Pass::Full));
    }
}
