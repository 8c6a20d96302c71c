//! Estimate tables and the contracts of the two collaborators the engine drives.
//!
//! An [`EstimateTable`] has an explicit [`EstimateSchema`]: an ordered list of
//! identifier columns, which key the rows and are never used in arithmetic, and
//! an ordered list of numeric estimate columns stored as a dense
//! `rows x columns` matrix.

use ahash::AHashSet;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    Text,
    Integer,
    Real,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
        })
    }
}

/// A single identifier cell.
///
/// Real values compare and hash by bit pattern, so two keys match only when
/// the estimator produced exactly the same identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IdentifierValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl IdentifierValue {
    pub fn kind(&self) -> IdentifierKind {
        match self {
            Self::Text(_) => IdentifierKind::Text,
            Self::Integer(_) => IdentifierKind::Integer,
            Self::Real(_) => IdentifierKind::Real,
        }
    }
}

impl PartialEq for IdentifierValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for IdentifierValue {}

impl Hash for IdentifierValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Text(v) => v.hash(state),
            Self::Integer(v) => v.hash(state),
            Self::Real(v) => v.to_bits().hash(state),
        }
    }
}

impl fmt::Display for IdentifierValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(v) => f.write_str(v),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
        }
    }
}

/// The identifier values of one row, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey(Vec<IdentifierValue>);

impl RowKey {
    pub fn new(values: Vec<IdentifierValue>) -> Self {
        Self(values)
    }

    #[inline]
    pub fn values(&self) -> &[IdentifierValue] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierColumn {
    pub name: String,
    pub kind: IdentifierKind,
}

impl IdentifierColumn {
    pub fn new(name: impl Into<String>, kind: IdentifierKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Declared column layout of an estimator's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateSchema {
    identifiers: Vec<IdentifierColumn>,
    numerics: Vec<String>,
}

impl EstimateSchema {
    pub fn new(
        identifiers: Vec<IdentifierColumn>,
        numerics: Vec<String>,
    ) -> Result<Self, TableError> {
        if numerics.is_empty() {
            return Err(TableError::NoNumericColumns);
        }
        let mut seen = AHashSet::with_capacity(identifiers.len() + numerics.len());
        for name in identifiers.iter().map(|c| &c.name).chain(numerics.iter()) {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self {
            identifiers,
            numerics,
        })
    }

    #[inline]
    pub fn identifiers(&self) -> &[IdentifierColumn] {
        &self.identifiers
    }

    #[inline]
    pub fn numerics(&self) -> &[String] {
        &self.numerics
    }

    pub fn numeric_position(&self, name: &str) -> Option<usize> {
        self.numerics.iter().position(|c| c == name)
    }

    /// Every column name: identifiers first, then numeric columns.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.identifiers
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.numerics.iter().map(String::as_str))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_names().any(|c| c == name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("an estimate schema needs at least one numeric column")]
    NoNumericColumns,
    #[error("column '{0}' appears more than once in the schema")]
    DuplicateColumn(String),
    #[error("row {row} has {found} identifier values but the schema declares {expected}")]
    KeyArity {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("row {row}: identifier column '{column}' expects {expected} values, found {found}")]
    KeyKind {
        row: usize,
        column: String,
        expected: IdentifierKind,
        found: IdentifierKind,
    },
    #[error("value matrix has shape {found:?} but {expected:?} was expected")]
    ValueShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("identifier key {0} appears on more than one row")]
    DuplicateKey(String),
}

/// Output of an [`Estimator`]: keyed rows of numeric estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateTable {
    schema: EstimateSchema,
    keys: Vec<RowKey>,
    values: Array2<f64>,
}

impl EstimateTable {
    pub fn new(
        schema: EstimateSchema,
        keys: Vec<RowKey>,
        values: Array2<f64>,
    ) -> Result<Self, TableError> {
        let expected = (keys.len(), schema.numerics.len());
        if values.dim() != expected {
            return Err(TableError::ValueShape {
                expected,
                found: values.dim(),
            });
        }

        let mut seen = AHashSet::with_capacity(keys.len());
        for (row, key) in keys.iter().enumerate() {
            if key.values().len() != schema.identifiers.len() {
                return Err(TableError::KeyArity {
                    row,
                    expected: schema.identifiers.len(),
                    found: key.values().len(),
                });
            }
            for (column, value) in schema.identifiers.iter().zip(key.values()) {
                if value.kind() != column.kind {
                    return Err(TableError::KeyKind {
                        row,
                        column: column.name.clone(),
                        expected: column.kind,
                        found: value.kind(),
                    });
                }
            }
            if !seen.insert(key) {
                return Err(TableError::DuplicateKey(key.to_string()));
            }
        }

        Ok(Self {
            schema,
            keys,
            values,
        })
    }

    #[inline]
    pub fn schema(&self) -> &EstimateSchema {
        &self.schema
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    #[inline]
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.schema
            .numeric_position(name)
            .map(|j| self.values.column(j))
    }

    pub fn row_of(&self, key: &RowKey) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn value(&self, key: &RowKey, column: &str) -> Option<f64> {
        let row = self.row_of(key)?;
        let col = self.schema.numeric_position(column)?;
        Some(self.values[[row, col]])
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventTableError {
    #[error("cannot build an event table from an empty sample")]
    EmptySample,
    #[error("individual {index} has state {state}, which is outside the declared state space")]
    UnknownState { index: usize, state: u32 },
    #[error("event table construction failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("fixed time horizon {horizon} is outside the evaluable domain [{lower}, {upper}]")]
    InvalidHorizon { horizon: f64, lower: f64, upper: f64 },
    #[error("estimator produced a malformed table: {0}")]
    Table(#[from] TableError),
    #[error("estimation failed: {0}")]
    Failed(String),
}

/// Turns a sample into whatever intermediate representation the estimator
/// consumes. Must be deterministic.
pub trait EventTableBuilder {
    type EventTable;

    fn build_event_table(&self, sample: &Sample) -> Result<Self::EventTable, EventTableError>;
}

/// Evaluates estimates at a set of time horizons.
///
/// Implementations must return tables whose schema equals [`Estimator::schema`]
/// and whose row keys depend only on the horizons and the state space, never on
/// which individuals the event table was built from.
pub trait Estimator<T> {
    fn schema(&self) -> &EstimateSchema;

    fn evaluate(&self, event_table: &T, horizons: &[f64]) -> Result<EstimateTable, EstimatorError>;
}
