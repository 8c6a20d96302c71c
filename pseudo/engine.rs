//! # Pseudo-Observation Engine
//!
//! Computes jackknife pseudo-observations at a fixed time horizon:
//!
//! ```text
//! pseudo_i = n * theta_full - (n - 1) * theta_(-i)
//! ```
//!
//! `theta_full` is estimated once on the complete sample. Each `theta_(-i)` is
//! estimated on a fresh subsample without individual `i` and joined to
//! `theta_full` on the identifier columns before any arithmetic, so a
//! leave-one-out table with a different layout or key set is rejected rather
//! than silently misaligned. Identifier values in the output always come from
//! `theta_full`.
//!
//! The loop makes `n + 1` calls to each collaborator and is therefore
//! quadratic or worse in the sample size.

use ahash::{AHashMap, AHashSet};
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView1, ArrayView2, Zip, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::estimate::{
    EstimateSchema, EstimateTable, Estimator, EstimatorError, EventTableBuilder, EventTableError,
    RowKey, TableError,
};
use crate::progress::{LeaveOneOutObserver, NoopProgress, Pass};
use crate::sample::{Sample, SampleError};

pub const DEFAULT_ROW_INDEX_COLUMN: &str = "row_id";

/// Smallest sample the jackknife accepts.
pub const MINIMUM_SAMPLE_SIZE: usize = 2;

/// How a leave-one-out table differs from the full-sample table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeMismatch {
    #[error("column layout differs from the estimator's declared schema")]
    Schema,
    #[error("row {0} of the full-sample estimate has no counterpart")]
    MissingKey(String),
    #[error("row {0} has no counterpart in the full-sample estimate")]
    UnexpectedKey(String),
}

#[derive(Error, Debug)]
pub enum PseudoError {
    #[error("pseudo-observations need at least 2 individuals, found {found}")]
    SampleTooSmall { found: usize },
    #[error("row index column '{0}' collides with an estimate column")]
    RowIndexColumnCollision(String),
    #[error("event table construction failed on the {pass}: {source}")]
    EventTable {
        pass: Pass,
        #[source]
        source: EventTableError,
    },
    #[error("estimation failed on the {pass}: {source}")]
    Estimation {
        pass: Pass,
        #[source]
        source: EstimatorError,
    },
    #[error("the {pass} produced an inconsistent estimate table: {mismatch}")]
    DataShape { pass: Pass, mismatch: ShapeMismatch },
    #[error("could not construct a leave-one-out subsample: {0}")]
    Subsample(#[from] SampleError),
    #[error("cancelled after {completed} of {total} leave-one-out passes")]
    Cancelled { completed: usize, total: usize },
}

impl PseudoError {
    /// True when the estimator rejected the fixed time horizon.
    pub fn is_invalid_horizon(&self) -> bool {
        matches!(
            self,
            Self::Estimation {
                source: EstimatorError::InvalidHorizon { .. },
                ..
            }
        )
    }

    /// The pass that failed, when the failure is tied to one.
    pub fn pass(&self) -> Option<Pass> {
        match self {
            Self::EventTable { pass, .. }
            | Self::Estimation { pass, .. }
            | Self::DataShape { pass, .. } => Some(*pass),
            _ => None,
        }
    }
}

/// What the numeric columns of a [`PseudoObservationTable`] hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockValues {
    /// `n * theta_full - (n - 1) * theta_(-i)`.
    PseudoObservation,
    /// The raw `theta_(-i)`.
    LeaveOneOutEstimate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Name of the output column recording the excluded individual.
    pub row_index_column: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            row_index_column: DEFAULT_ROW_INDEX_COLUMN.to_string(),
        }
    }
}

/// One block of the output: the rows produced by leaving out one individual.
#[derive(Debug, Clone, Copy)]
pub struct PseudoBlock<'a> {
    pub excluded: usize,
    pub keys: &'a [RowKey],
    pub values: ArrayView2<'a, f64>,
}

/// `n` stacked blocks, each shaped like the full-sample estimate table, in
/// order of the excluded individual.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoObservationTable {
    kind: BlockValues,
    schema: EstimateSchema,
    row_index_column: String,
    block_keys: Vec<RowKey>,
    excluded: Vec<usize>,
    values: Array2<f64>,
}

impl PseudoObservationTable {
    #[inline]
    pub fn kind(&self) -> BlockValues {
        self.kind
    }

    #[inline]
    pub fn schema(&self) -> &EstimateSchema {
        &self.schema
    }

    #[inline]
    pub fn row_index_column(&self) -> &str {
        &self.row_index_column
    }

    /// Total number of rows over all blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    #[inline]
    pub fn n_blocks(&self) -> usize {
        self.excluded.len()
    }

    /// Identifier keys shared by every block, in full-sample row order.
    #[inline]
    pub fn block_keys(&self) -> &[RowKey] {
        &self.block_keys
    }

    #[inline]
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Identifier key of an output row, or `None` past the last row.
    pub fn key(&self, row: usize) -> Option<&RowKey> {
        if row >= self.len() {
            return None;
        }
        self.block_keys.get(row % self.block_keys.len())
    }

    /// Excluded individual for each output row.
    pub fn row_ids(&self) -> impl Iterator<Item = usize> + '_ {
        let rows = self.block_keys.len();
        self.excluded
            .iter()
            .flat_map(move |&id| std::iter::repeat_n(id, rows))
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.schema
            .numeric_position(name)
            .map(|j| self.values.column(j))
    }

    pub fn block(&self, b: usize) -> Option<PseudoBlock<'_>> {
        let excluded = *self.excluded.get(b)?;
        let rows = self.block_keys.len();
        Some(PseudoBlock {
            excluded,
            keys: &self.block_keys,
            values: self.values.slice(s![b * rows..(b + 1) * rows, ..]),
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = PseudoBlock<'_>> + '_ {
        (0..self.n_blocks()).filter_map(move |b| self.block(b))
    }

    /// Per-key mean of every numeric column across the blocks.
    pub fn mean_by_key(&self) -> Result<EstimateTable, TableError> {
        let rows = self.block_keys.len();
        let mut sums = Array2::<f64>::zeros((rows, self.schema.numerics().len()));
        for block in self.blocks() {
            sums += &block.values;
        }
        if !self.excluded.is_empty() {
            sums /= self.excluded.len() as f64;
        }
        EstimateTable::new(self.schema.clone(), self.block_keys.clone(), sums)
    }
}

/// Drives an [`EventTableBuilder`] and an [`Estimator`] through the full
/// sample and every leave-one-out subsample.
#[derive(Debug, Clone)]
pub struct PseudoObservationEngine<B, E> {
    builder: B,
    estimator: E,
    options: EngineOptions,
}

impl<B, E> PseudoObservationEngine<B, E>
where
    B: EventTableBuilder,
    E: Estimator<B::EventTable>,
{
    pub fn new(builder: B, estimator: E) -> Self {
        Self {
            builder,
            estimator,
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn builder(&self) -> &B {
        &self.builder
    }

    #[inline]
    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    #[inline]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Pseudo-observations for every individual at `fixed_time_horizon`.
    pub fn compute(
        &self,
        sample: &Sample,
        fixed_time_horizon: f64,
    ) -> Result<PseudoObservationTable, PseudoError> {
        self.compute_with_observer(sample, fixed_time_horizon, &mut NoopProgress)
    }

    pub fn compute_with_observer(
        &self,
        sample: &Sample,
        fixed_time_horizon: f64,
        observer: &mut dyn LeaveOneOutObserver,
    ) -> Result<PseudoObservationTable, PseudoError> {
        self.run(
            sample,
            fixed_time_horizon,
            BlockValues::PseudoObservation,
            observer,
        )
    }

    /// The raw leave-one-out estimates `theta_(-i)`, laid out exactly like
    /// [`compute`](Self::compute) output but without the jackknife step.
    pub fn leave_one_out_estimates(
        &self,
        sample: &Sample,
        fixed_time_horizon: f64,
    ) -> Result<PseudoObservationTable, PseudoError> {
        self.leave_one_out_estimates_with_observer(sample, fixed_time_horizon, &mut NoopProgress)
    }

    pub fn leave_one_out_estimates_with_observer(
        &self,
        sample: &Sample,
        fixed_time_horizon: f64,
        observer: &mut dyn LeaveOneOutObserver,
    ) -> Result<PseudoObservationTable, PseudoError> {
        self.run(
            sample,
            fixed_time_horizon,
            BlockValues::LeaveOneOutEstimate,
            observer,
        )
    }

    /// Estimate on one sample.
    pub fn estimate(
        &self,
        sample: &Sample,
        fixed_time_horizon: f64,
        pass: Pass,
    ) -> Result<EstimateTable, PseudoError> {
        let event_table = self
            .builder
            .build_event_table(sample)
            .map_err(|source| PseudoError::EventTable { pass, source })?;
        self.estimator
            .evaluate(&event_table, &[fixed_time_horizon])
            .map_err(|source| PseudoError::Estimation { pass, source })
    }

    fn run(
        &self,
        sample: &Sample,
        fixed_time_horizon: f64,
        kind: BlockValues,
        observer: &mut dyn LeaveOneOutObserver,
    ) -> Result<PseudoObservationTable, PseudoError> {
        let n = sample.len();
        if n < MINIMUM_SAMPLE_SIZE {
            return Err(PseudoError::SampleTooSmall { found: n });
        }
        let row_index_column = self.options.row_index_column.clone();
        if self.estimator.schema().contains(&row_index_column) {
            return Err(PseudoError::RowIndexColumnCollision(row_index_column));
        }

        let theta_full = self.estimate(sample, fixed_time_horizon, Pass::Full)?;
        if theta_full.schema() != self.estimator.schema() {
            return Err(PseudoError::DataShape {
                pass: Pass::Full,
                mismatch: ShapeMismatch::Schema,
            });
        }

        let rows = theta_full.n_rows();
        let n_numeric = theta_full.schema().numerics().len();
        info!(
            "Computing {:?} blocks for {} individuals at horizon {} ({} estimate rows x {} numeric columns)",
            kind, n, fixed_time_horizon, rows, n_numeric
        );

        let n_f = n as f64;
        let loo_scale = (n - 1) as f64;
        let mut values = Array2::<f64>::zeros((n * rows, n_numeric));
        let mut excluded = Vec::with_capacity(n);

        observer.on_start(n);
        for position in 0..n {
            let id = sample.individuals()[position].index;
            let pass = Pass::LeaveOneOut(id);
            let subsample = sample.without(position)?;
            let theta_loo = self.estimate(&subsample, fixed_time_horizon, pass)?;
            let aligned = align_to_full(&theta_full, &theta_loo)
                .map_err(|mismatch| PseudoError::DataShape { pass, mismatch })?;

            let mut block = values.slice_mut(s![position * rows..(position + 1) * rows, ..]);
            match kind {
                BlockValues::PseudoObservation => {
                    Zip::from(&mut block)
                        .and(theta_full.values())
                        .and(&aligned)
                        .for_each(|out, &full, &loo| *out = n_f * full - loo_scale * loo);
                }
                BlockValues::LeaveOneOutEstimate => block.assign(&aligned),
            }

            excluded.push(id);
            debug!("Finished leave-one-out pass {}/{} (individual {})", position + 1, n, id);

            if observer.on_pass_complete(id).is_break() && position + 1 < n {
                warn!(
                    "Pseudo-observation computation cancelled after {} of {} passes",
                    position + 1,
                    n
                );
                observer.on_finish();
                return Err(PseudoError::Cancelled {
                    completed: position + 1,
                    total: n,
                });
            }
        }
        observer.on_finish();

        info!("Produced {} rows across {} blocks", values.nrows(), n);
        Ok(PseudoObservationTable {
            kind,
            schema: theta_full.schema().clone(),
            row_index_column,
            block_keys: theta_full.keys().to_vec(),
            excluded,
            values,
        })
    }
}

/// Reorders the numeric values of `loo` into `full`'s row order by joining on
/// the identifier keys.
fn align_to_full(full: &EstimateTable, loo: &EstimateTable) -> Result<Array2<f64>, ShapeMismatch> {
    if loo.schema() != full.schema() {
        return Err(ShapeMismatch::Schema);
    }

    let loo_rows: AHashMap<&RowKey, usize> = loo
        .keys()
        .iter()
        .enumerate()
        .map(|(row, key)| (key, row))
        .collect();

    let mut aligned = Array2::<f64>::zeros(full.values().dim());
    for (row, key) in full.keys().iter().enumerate() {
        let loo_row = loo_rows
            .get(key)
            .ok_or_else(|| ShapeMismatch::MissingKey(key.to_string()))?;
        aligned.row_mut(row).assign(&loo.values().row(*loo_row));
    }

    // Keys are unique within a table, so surplus rows carry keys `full` lacks.
    if loo.n_rows() != full.n_rows() {
        let full_keys: AHashSet<&RowKey> = full.keys().iter().collect();
        let extra = loo
            .keys()
            .iter()
            .find(|key| !full_keys.contains(key))
            .map_or_else(String::new, ToString::to_string);
        return Err(ShapeMismatch::UnexpectedKey(extra));
    }

    Ok(aligned)
}
