use crate::dataframe::ContinuousSummary;
use crate::error::{AnnoError, Result};
use crate::schema::ColumnSchema;
use crate::types::{Column, Field};
use serde::{Deserialize, Serialize};

/// Quantile bounds of a clip view, as requested. Clamping to `[0, 1]`
/// happens when the clip is applied, so the requested range is what gets
/// reported back and re-applied after a reset.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ClipRange {
    pub min: f64,
    pub max: f64,
}

impl ClipRange {
    pub const FULL: ClipRange = ClipRange { min: 0.0, max: 1.0 };

    pub fn new(min: f64, max: f64) -> Result<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(AnnoError::invariant(format!("invalid clip range [{min}, {max}]")));
        }
        Ok(Self { min, max })
    }

    pub fn clamped(&self) -> ClipRange {
        ClipRange {
            min: self.min.max(0.0),
            max: self.max.min(1.0),
        }
    }

    /// Whether clipping with this range leaves every value in place.
    pub fn is_full(&self) -> bool {
        self.clamped() == Self::FULL
    }
}

/// Replace every value outside `[lower, upper]` with `sentinel`. NaN bounds
/// clip nothing.
pub fn clip_values(values: &[f32], lower: f32, upper: f32, sentinel: f32) -> Vec<f32> {
    if lower.is_nan() || upper.is_nan() {
        return values.to_vec();
    }
    values
        .iter()
        .map(|&x| if x < lower || x > upper { sentinel } else { x })
        .collect()
}

/// Clip one column against its own percentiles. Only continuous `obs` and
/// `X` columns are touched; `int32` data comes back as `float32`.
pub(crate) fn clip_column(field: Field, schema: &ColumnSchema, col: &Column, range: ClipRange) -> Result<Column> {
    if field == Field::Var || !schema.is_continuous() || range.is_full() {
        return Ok(col.clone());
    }
    let Some(values) = col.to_f32_vec() else {
        return Err(AnnoError::TypeMismatch {
            column: schema.name.clone(),
            expected: schema.dtype.to_string(),
            got: col.dtype().to_string(),
        });
    };
    let range = range.clamped();
    let summary = ContinuousSummary::from_values(&values);
    let lower = summary.quantile(range.min);
    let upper = summary.quantile(range.max);
    Ok(Column::from(clip_values(&values, lower, upper, f32::NAN)))
}
