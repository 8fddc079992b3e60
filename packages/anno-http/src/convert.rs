//! Conversion between wire batches and column stores.

use annomatrix::{AnnoError, Column, DataFrame, RowIndex, Selector};
use anno_protocol::{ColumnBatch, ColumnSelector, WireColumn, WireData};
use smol_str::SmolStr;

pub fn selector_to_wire(selector: &Selector) -> ColumnSelector {
    match selector {
        Selector::All => ColumnSelector::All,
        Selector::Labels(labels) => ColumnSelector::Labels {
            labels: labels.iter().map(|l| l.to_string()).collect(),
        },
        Selector::Where(w) => ColumnSelector::Where {
            field: w.field.to_string(),
            column: w.column.to_string(),
            value: w.value.to_string(),
        },
    }
}

/// Decode a response batch. `null` floats become NaN; every column must have
/// `n_rows` values.
pub fn batch_to_frame(batch: ColumnBatch) -> annomatrix::Result<DataFrame> {
    let n_rows = batch.n_rows;
    let columns = batch
        .columns
        .into_iter()
        .map(|WireColumn { label, data }| {
            if data.len() != n_rows {
                return Err(AnnoError::remote(
                    None,
                    format!("column '{label}' has {} values, batch has {n_rows} rows", data.len()),
                ));
            }
            let column = match data {
                WireData::Float32(v) => Column::from(v.into_iter().map(|x| x.unwrap_or(f32::NAN)).collect::<Vec<_>>()),
                WireData::Int32(v) => Column::from(v),
                WireData::Boolean(v) => Column::from(v),
                WireData::String(v) => Column::Str(v.into_iter().map(SmolStr::from).collect()),
            };
            Ok((SmolStr::from(label), column))
        })
        .collect::<annomatrix::Result<Vec<_>>>()?;
    DataFrame::new(RowIndex::identity(n_rows), columns)
}

/// Encode a frame for output. Non-finite floats become `null`.
pub fn frame_to_batch(df: &DataFrame) -> ColumnBatch {
    let columns = df
        .iter()
        .map(|(label, col)| {
            let data = match col {
                Column::Float32(v) => WireData::Float32(v.iter().map(|x| x.is_finite().then_some(*x)).collect()),
                Column::Int32(v) => WireData::Int32(v.to_vec()),
                Column::Bool(v) => WireData::Boolean(v.to_vec()),
                Column::Str(v) => WireData::String(v.iter().map(|s| s.to_string()).collect()),
            };
            WireColumn {
                label: label.to_string(),
                data,
            }
        })
        .collect();
    ColumnBatch {
        n_rows: df.n_rows(),
        columns,
    }
}
