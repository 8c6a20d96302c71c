//! Conversion of result tables into polars `DataFrame`s and TSV files.

use polars::prelude::*;
use std::fs::File;
use std::path::Path;

use crate::engine::PseudoObservationTable;
use crate::estimate::{IdentifierKind, IdentifierValue};

/// Identifier columns in schema order, then the numeric columns, then the
/// row-index column.
pub fn to_dataframe(table: &PseudoObservationTable) -> PolarsResult<DataFrame> {
    let schema = table.schema();
    let mut columns: Vec<Column> =
        Vec::with_capacity(schema.identifiers().len() + schema.numerics().len() + 1);

    for (j, identifier) in schema.identifiers().iter().enumerate() {
        let name: PlSmallStr = identifier.name.as_str().into();
        let cells = table
            .blocks()
            .flat_map(|block| block.keys)
            .map(|key| &key.values()[j]);
        let series = match identifier.kind {
            IdentifierKind::Text => Series::new(
                name,
                cells
                    .map(|v| match v {
                        IdentifierValue::Text(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
            IdentifierKind::Integer => Series::new(
                name,
                cells
                    .map(|v| match v {
                        IdentifierValue::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
            IdentifierKind::Real => Series::new(
                name,
                cells
                    .map(|v| match v {
                        IdentifierValue::Real(x) => Some(*x),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
        };
        columns.push(series.into());
    }

    for (j, numeric) in schema.numerics().iter().enumerate() {
        let values = table.values().column(j).to_vec();
        columns.push(Series::new(numeric.as_str().into(), values).into());
    }

    let row_ids: Vec<u64> = table.row_ids().map(|id| id as u64).collect();
    columns.push(Series::new(table.row_index_column().into(), row_ids).into());

    DataFrame::new(columns)
}

/// Writes `df` tab-separated with a header row.
pub fn write_tsv(df: &mut DataFrame, path: &Path) -> PolarsResult<()> {
    let file = File::create(path)?;
    CsvWriter::new(file).with_separator(b'\t').finish(df)
}
