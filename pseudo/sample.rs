//! Individual-level input records and leave-one-out subsampling.
//!
//! A [`Sample`] is an ordered collection of [`Individual`] records. Each
//! individual carries an explicit `index` assigned when the sample is built, so
//! a subsample produced by [`Sample::without`] still knows which individuals it
//! holds even though it is shorter than the sample it came from.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One observed individual: the time of the transition (or censoring) and the
/// realized state code at that time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// Position of the individual in the full sample it was loaded from.
    pub index: usize,
    pub time: f64,
    pub state: u32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("times has {times} entries but states has {states}")]
    LengthMismatch { times: usize, states: usize },
    #[error("time for individual {index} is not finite ({value})")]
    NonFiniteTime { index: usize, value: f64 },
    #[error("time for individual {index} is negative ({value})")]
    NegativeTime { index: usize, value: f64 },
    #[error("cannot exclude position {index}; the sample has {len} individuals")]
    IndexOutOfRange { index: usize, len: usize },
}

/// An immutable, ordered sample of individuals.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    individuals: Vec<Individual>,
}

impl Sample {
    /// Builds a sample from parallel time and state columns. Individual `i`
    /// receives index `i`.
    pub fn new(times: Vec<f64>, states: Vec<u32>) -> Result<Self, SampleError> {
        if times.len() != states.len() {
            return Err(SampleError::LengthMismatch {
                times: times.len(),
                states: states.len(),
            });
        }

        let individuals = times
            .into_iter()
            .zip(states)
            .enumerate()
            .map(|(index, (time, state))| {
                if !time.is_finite() {
                    return Err(SampleError::NonFiniteTime { index, value: time });
                }
                if time < 0.0 {
                    return Err(SampleError::NegativeTime { index, value: time });
                }
                Ok(Individual { index, time, state })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { individuals })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    #[inline]
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.individuals.iter().map(|ind| ind.time)
    }

    pub fn states(&self) -> impl Iterator<Item = u32> + '_ {
        self.individuals.iter().map(|ind| ind.state)
    }

    /// Largest observed time, or `None` for an empty sample.
    pub fn max_time(&self) -> Option<f64> {
        self.times().reduce(f64::max)
    }

    /// Returns a new sample holding every individual except the one at
    /// `position`, in the original relative order. The original indices of the
    /// retained individuals are kept.
    pub fn without(&self, position: usize) -> Result<Sample, SampleError> {
        if position >= self.individuals.len() {
            return Err(SampleError::IndexOutOfRange {
                index: position,
                len: self.individuals.len(),
            });
        }

        let mut individuals = Vec::with_capacity(self.individuals.len() - 1);
        individuals.extend_from_slice(&self.individuals[..position]);
        individuals.extend_from_slice(&self.individuals[position + 1..]);
        Ok(Sample { individuals })
    }
}
