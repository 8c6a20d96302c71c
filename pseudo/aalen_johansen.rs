//! Aalen-Johansen state occupation for an initial state with competing
//! absorbing states.
//!
//! Every individual starts in the initial state. A realized state equal to the
//! censoring code means the individual was still in the initial state when
//! follow-up ended; any other code is the absorbing state entered at the
//! recorded time. At tied times events are processed before censorings.

use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::engine::{PseudoError, PseudoObservationEngine, PseudoObservationTable};
use crate::estimate::{
    EstimateSchema, EstimateTable, Estimator, EstimatorError, EventTableBuilder, EventTableError,
    IdentifierColumn, IdentifierKind, IdentifierValue, RowKey,
};
use crate::sample::Sample;

pub const DEFAULT_CENSORING_STATE: u32 = 0;
pub const ESTIMATE_ORIGIN: &str = "fixed_time_horizons";
pub const ESTIMATE_ORIGIN_COLUMN: &str = "estimate_origin";
pub const STATE_COLUMN: &str = "state";
pub const TIMES_COLUMN: &str = "times";
pub const STATE_OCCUPANCY_COLUMN: &str = "state_occupancy_probability";
pub const CUMULATIVE_HAZARD_COLUMN: &str = "cumulative_hazard";

/// Counts at one distinct observed time.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSetRow {
    pub time: f64,
    /// Individuals still in the initial state just before `time`.
    pub at_risk: usize,
    pub censored: usize,
    /// Transitions into each absorbing state, in state-space order.
    pub events: Vec<usize>,
}

impl RiskSetRow {
    #[inline]
    pub fn total_events(&self) -> usize {
        self.events.iter().sum()
    }
}

/// Risk sets over the distinct observed times, ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSetTable {
    censoring_state: u32,
    states: Vec<u32>,
    rows: Vec<RiskSetRow>,
}

impl RiskSetTable {
    #[inline]
    pub fn censoring_state(&self) -> u32 {
        self.censoring_state
    }

    /// The absorbing states, ascending.
    #[inline]
    pub fn states(&self) -> &[u32] {
        &self.states
    }

    #[inline]
    pub fn rows(&self) -> &[RiskSetRow] {
        &self.rows
    }
}

/// Builds a [`RiskSetTable`] over a fixed state space, so that every
/// subsample of one sample yields the same set of states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AalenJohansenBuilder {
    censoring_state: u32,
    states: Vec<u32>,
}

impl AalenJohansenBuilder {
    pub fn with_states(censoring_state: u32, states: impl IntoIterator<Item = u32>) -> Self {
        let states = states
            .into_iter()
            .filter(|&s| s != censoring_state)
            .sorted_unstable()
            .dedup()
            .collect();
        Self {
            censoring_state,
            states,
        }
    }

    /// Uses the absorbing states observed in `sample`.
    pub fn for_sample(sample: &Sample, censoring_state: u32) -> Self {
        Self::with_states(censoring_state, sample.states())
    }

    #[inline]
    pub fn censoring_state(&self) -> u32 {
        self.censoring_state
    }

    #[inline]
    pub fn states(&self) -> &[u32] {
        &self.states
    }
}

impl EventTableBuilder for AalenJohansenBuilder {
    type EventTable = RiskSetTable;

    fn build_event_table(&self, sample: &Sample) -> Result<RiskSetTable, EventTableError> {
        if sample.is_empty() {
            return Err(EventTableError::EmptySample);
        }

        // Column of each individual's absorbing state, None when censored.
        let mut records = Vec::with_capacity(sample.len());
        for ind in sample.individuals() {
            let column = if ind.state == self.censoring_state {
                None
            } else {
                let position = self.states.binary_search(&ind.state).map_err(|_| {
                    EventTableError::UnknownState {
                        index: ind.index,
                        state: ind.state,
                    }
                })?;
                Some(position)
            };
            records.push((ind.time, column));
        }
        records.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut rows = Vec::new();
        let mut at_risk = records.len();
        for (time, group) in &records.iter().chunk_by(|(time, _)| *time) {
            let mut events = vec![0usize; self.states.len()];
            let mut censored = 0usize;
            for (_, column) in group {
                match column {
                    Some(k) => events[*k] += 1,
                    None => censored += 1,
                }
            }
            let leaving = censored + events.iter().sum::<usize>();
            rows.push(RiskSetRow {
                time,
                at_risk,
                censored,
                events,
            });
            at_risk -= leaving;
        }

        Ok(RiskSetTable {
            censoring_state: self.censoring_state,
            states: self.states.clone(),
            rows,
        })
    }
}

/// Evaluates state occupation probabilities and Nelson-Aalen cumulative
/// hazards from a [`RiskSetTable`].
///
/// Output has one row per (horizon, state): the initial state first, labelled
/// with the censoring code, then each absorbing state.
#[derive(Debug, Clone, PartialEq)]
pub struct AalenJohansenEstimator {
    schema: EstimateSchema,
    horizon_limit: Option<f64>,
}

impl Default for AalenJohansenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl AalenJohansenEstimator {
    pub fn new() -> Self {
        let identifiers = vec![
            IdentifierColumn::new(ESTIMATE_ORIGIN_COLUMN, IdentifierKind::Text),
            IdentifierColumn::new(STATE_COLUMN, IdentifierKind::Integer),
            IdentifierColumn::new(TIMES_COLUMN, IdentifierKind::Real),
        ];
        let numerics = vec![
            STATE_OCCUPANCY_COLUMN.to_string(),
            CUMULATIVE_HAZARD_COLUMN.to_string(),
        ];
        Self {
            schema: EstimateSchema::new(identifiers, numerics)
                .expect("Aalen-Johansen column names are distinct"),
            horizon_limit: None,
        }
    }

    /// Rejects horizons above `limit`.
    pub fn with_horizon_limit(mut self, limit: f64) -> Self {
        self.horizon_limit = Some(limit);
        self
    }

    /// Limits horizons to the largest time observed in `sample`.
    pub fn for_sample(sample: &Sample) -> Self {
        let estimator = Self::new();
        match sample.max_time() {
            Some(limit) => estimator.with_horizon_limit(limit),
            None => estimator,
        }
    }

    #[inline]
    pub fn horizon_limit(&self) -> Option<f64> {
        self.horizon_limit
    }

    fn check_horizon(&self, horizon: f64) -> Result<(), EstimatorError> {
        let upper = self.horizon_limit.unwrap_or(f64::INFINITY);
        if !horizon.is_finite() || horizon < 0.0 || horizon > upper {
            return Err(EstimatorError::InvalidHorizon {
                horizon,
                lower: 0.0,
                upper,
            });
        }
        Ok(())
    }
}

impl Estimator<RiskSetTable> for AalenJohansenEstimator {
    fn schema(&self) -> &EstimateSchema {
        &self.schema
    }

    fn evaluate(
        &self,
        event_table: &RiskSetTable,
        horizons: &[f64],
    ) -> Result<EstimateTable, EstimatorError> {
        for &horizon in horizons {
            self.check_horizon(horizon)?;
        }

        let n_states = event_table.states.len() + 1;
        let mut keys = Vec::with_capacity(horizons.len() * n_states);
        let mut values = Array2::<f64>::zeros((horizons.len() * n_states, 2));

        for (h, &horizon) in horizons.iter().enumerate() {
            let mut survival = 1.0_f64;
            let mut hazard_out = 0.0_f64;
            let mut occupancy = vec![0.0_f64; event_table.states.len()];
            let mut hazard = vec![0.0_f64; event_table.states.len()];

            for row in event_table.rows.iter().take_while(|r| r.time <= horizon) {
                let d_total = row.total_events();
                if d_total == 0 {
                    continue;
                }
                let y = row.at_risk as f64;
                for (k, &d) in row.events.iter().enumerate() {
                    let h_k = d as f64 / y;
                    occupancy[k] += survival * h_k;
                    hazard[k] += h_k;
                }
                hazard_out += d_total as f64 / y;
                survival *= 1.0 - d_total as f64 / y;
            }

            let base = h * n_states;
            let labels = std::iter::once(event_table.censoring_state)
                .chain(event_table.states.iter().copied());
            for (offset, state) in labels.enumerate() {
                keys.push(RowKey::new(vec![
                    IdentifierValue::Text(ESTIMATE_ORIGIN.to_string()),
                    IdentifierValue::Integer(i64::from(state)),
                    IdentifierValue::Real(horizon),
                ]));
                let (p, lambda) = if offset == 0 {
                    (survival, hazard_out)
                } else {
                    (occupancy[offset - 1], hazard[offset - 1])
                };
                values[[base + offset, 0]] = p;
                values[[base + offset, 1]] = lambda;
            }
        }

        Ok(EstimateTable::new(self.schema.clone(), keys, values)?)
    }
}

/// Engine over the Aalen-Johansen collaborators, with the state space and
/// horizon limit taken from `sample`.
pub fn aalen_johansen_engine(
    sample: &Sample,
    censoring_state: u32,
) -> PseudoObservationEngine<AalenJohansenBuilder, AalenJohansenEstimator> {
    PseudoObservationEngine::new(
        AalenJohansenBuilder::for_sample(sample, censoring_state),
        AalenJohansenEstimator::for_sample(sample),
    )
}

/// Aalen-Johansen pseudo-observations at `fixed_time_horizon`, with state 0
/// as the censoring code.
pub fn calculate_pseudostates(
    sample: &Sample,
    fixed_time_horizon: f64,
) -> Result<PseudoObservationTable, PseudoError> {
    aalen_johansen_engine(sample, DEFAULT_CENSORING_STATE).compute(sample, fixed_time_horizon)
}
