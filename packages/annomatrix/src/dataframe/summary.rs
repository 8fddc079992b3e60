use crate::types::{Column, ColumnValue};
use std::sync::Arc;

/// Summary statistics for one column.
#[derive(Clone, Debug, PartialEq)]
pub enum Summary {
    Continuous(ContinuousSummary),
    Categorical(CategoricalSummary),
}

impl Summary {
    /// Numeric columns are summarized as continuous unless `categorical`
    /// is set; bool and string columns are always categorical.
    pub fn of(column: &Column, categorical: bool) -> Summary {
        match column.to_f32_vec() {
            Some(values) if !categorical => Summary::Continuous(ContinuousSummary::from_values(&values)),
            _ => Summary::Categorical(CategoricalSummary::from_column(column)),
        }
    }
}

/// Range and percentile table over the finite values of a column.
///
/// Percentiles use the nearest-rank rule on the sorted finite values:
/// `sorted[round(p / 100 * (n - 1))]`. Lookups are deterministic, so
/// recomputing a clip from the same data yields the same bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousSummary {
    pub min: f32,
    pub max: f32,
    pub n_finite: usize,
    sorted: Arc<[f32]>,
}

impl ContinuousSummary {
    pub fn from_values(values: &[f32]) -> Self {
        let mut sorted: Vec<f32> = values.iter().copied().filter(|x| x.is_finite()).collect();
        sorted.sort_by(f32::total_cmp);
        Self {
            min: sorted.first().copied().unwrap_or(f32::NAN),
            max: sorted.last().copied().unwrap_or(f32::NAN),
            n_finite: sorted.len(),
            sorted: sorted.into(),
        }
    }

    /// Value at percentile `p` in `[0, 100]`. NaN when no finite values exist.
    pub fn percentile(&self, p: f64) -> f32 {
        if self.sorted.is_empty() {
            return f32::NAN;
        }
        let p = p.clamp(0.0, 100.0);
        let rank = (p / 100.0 * (self.sorted.len() - 1) as f64).round() as usize;
        self.sorted[rank.min(self.sorted.len() - 1)]
    }

    /// Value at quantile `q` in `[0, 1]`.
    pub fn quantile(&self, q: f64) -> f32 {
        self.percentile(q * 100.0)
    }
}

/// Distinct values in first-seen order, with their counts.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoricalSummary {
    pub categories: Vec<ColumnValue>,
    pub counts: Vec<usize>,
}

impl CategoricalSummary {
    pub fn from_column(column: &Column) -> Self {
        let mut categories: Vec<ColumnValue> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for row in 0..column.len() {
            let Some(value) = column.get(row) else { continue };
            match categories.iter().position(|c| c == &value) {
                Some(idx) => counts[idx] += 1,
                None => {
                    categories.push(value);
                    counts.push(1);
                }
            }
        }
        Self { categories, counts }
    }

    pub fn count_of(&self, value: &ColumnValue) -> usize {
        self.categories
            .iter()
            .position(|c| c == value)
            .map(|idx| self.counts[idx])
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod summary_test {
    use super::*;

    #[test]
    fn test_nearest_rank_percentiles() {
        let s = ContinuousSummary::from_values(&[99.0, 1.0, 50.0, 5.0, 10.0]);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 99.0);
        assert_eq!(s.percentile(0.0), 1.0);
        assert_eq!(s.percentile(100.0), 99.0);
        assert_eq!(s.quantile(0.2), 5.0);
        assert_eq!(s.quantile(0.8), 50.0);
        assert_eq!(s.percentile(50.0), 10.0);
    }

    #[test]
    fn test_non_finite_excluded() {
        let s = ContinuousSummary::from_values(&[f32::NAN, 2.0, f32::INFINITY, 4.0]);
        assert_eq!(s.n_finite, 2);
        assert_eq!(s.percentile(100.0), 4.0);

        let empty = ContinuousSummary::from_values(&[f32::NAN]);
        assert!(empty.percentile(50.0).is_nan());
    }

    #[test]
    fn test_categorical_counts() {
        let col = Column::from(vec!["b", "a", "b", "b"]);
        let s = CategoricalSummary::from_column(&col);
        assert_eq!(s.categories, vec![ColumnValue::from("b"), ColumnValue::from("a")]);
        assert_eq!(s.count_of(&"b".into()), 3);
        assert_eq!(s.count_of(&"z".into()), 0);
    }
}
