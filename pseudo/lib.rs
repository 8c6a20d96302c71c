#![deny(dead_code)]
#![deny(unused_imports)]

//! Jackknife pseudo-observations for state occupation estimates at a fixed
//! time horizon.
//!
//! [`engine::PseudoObservationEngine`] drives any [`estimate::EventTableBuilder`]
//! and [`estimate::Estimator`] pair through the full sample and every
//! leave-one-out subsample. [`aalen_johansen`] provides the Aalen-Johansen
//! pair and the [`calculate_pseudostates`] shortcut.

pub mod aalen_johansen;
pub mod config;
pub mod data;
pub mod engine;
pub mod estimate;
pub mod frame;
pub mod progress;
pub mod sample;

pub use aalen_johansen::{aalen_johansen_engine, calculate_pseudostates};
pub use engine::{PseudoError, PseudoObservationEngine, PseudoObservationTable};
pub use sample::{Individual, Sample};
