use super::{FastMap, RowLabel};
use crate::error::{AnnoError, Result};
use std::sync::Arc;

/// Ordered mapping from row position to persistent row label.
///
/// The full dataset uses `Identity`, where label and position coincide.
/// Subsets carry an explicit label list plus the reverse lookup.
#[derive(Clone, Debug)]
pub enum RowIndex {
    Identity(usize),
    Labels {
        labels: Arc<[RowLabel]>,
        offsets: Arc<FastMap<RowLabel, usize>>,
    },
}

impl RowIndex {
    pub fn identity(len: usize) -> Self {
        RowIndex::Identity(len)
    }

    /// Labels must be unique.
    pub fn from_labels(labels: Vec<RowLabel>) -> Result<Self> {
        let mut offsets = FastMap::default();
        offsets.reserve(labels.len());
        for (pos, &label) in labels.iter().enumerate() {
            if offsets.insert(label, pos).is_some() {
                return Err(AnnoError::invariant(format!("duplicate row label {label}")));
            }
        }
        Ok(RowIndex::Labels {
            labels: labels.into(),
            offsets: Arc::new(offsets),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            RowIndex::Identity(n) => *n,
            RowIndex::Labels { labels, .. } => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn label_at(&self, pos: usize) -> Option<RowLabel> {
        match self {
            RowIndex::Identity(n) => (pos < *n).then_some(pos as RowLabel),
            RowIndex::Labels { labels, .. } => labels.get(pos).copied(),
        }
    }

    pub fn offset_of(&self, label: RowLabel) -> Option<usize> {
        match self {
            RowIndex::Identity(n) => ((label as usize) < *n).then_some(label as usize),
            RowIndex::Labels { offsets, .. } => offsets.get(&label).copied(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = RowLabel> + '_ {
        (0..self.len()).filter_map(move |pos| self.label_at(pos))
    }

    pub fn labels(&self) -> Vec<RowLabel> {
        self.iter().collect()
    }

    /// Index restricted to the given positions, in that order.
    pub fn isubset(&self, positions: &[usize]) -> Result<RowIndex> {
        let labels = positions
            .iter()
            .map(|&pos| {
                self.label_at(pos)
                    .ok_or_else(|| AnnoError::invariant(format!("row position {pos} out of range")))
            })
            .collect::<Result<Vec<_>>>()?;
        RowIndex::from_labels(labels)
    }

    /// Index restricted to the positions where `mask` is set.
    pub fn isubset_mask(&self, mask: &[bool]) -> Result<RowIndex> {
        if mask.len() != self.len() {
            return Err(AnnoError::invariant(format!(
                "mask length {} does not match row count {}",
                mask.len(),
                self.len()
            )));
        }
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(pos, &on)| on.then_some(pos))
            .collect();
        self.isubset(&positions)
    }

    /// Positions in `self` of every label of `target`, in `target` order.
    pub fn positions_of(&self, target: &RowIndex) -> Result<Vec<usize>> {
        target
            .iter()
            .map(|label| {
                self.offset_of(label)
                    .ok_or_else(|| AnnoError::invariant(format!("row label {label} not present")))
            })
            .collect()
    }
}

impl PartialEq for RowIndex {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RowIndex::Identity(a), RowIndex::Identity(b)) => a == b,
            _ => self.len() == other.len() && self.iter().eq(other.iter()),
        }
    }
}

#[cfg(test)]
mod row_index_test {
    use super::*;

    #[test]
    fn test_identity_lookup() {
        let idx = RowIndex::identity(4);
        assert_eq!(idx.label_at(2), Some(2));
        assert_eq!(idx.offset_of(4), None);
        assert_eq!(idx.labels(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_subset_keeps_labels() {
        let idx = RowIndex::identity(6);
        let sub = idx.isubset_mask(&[false, true, false, true, true, false]).unwrap();
        assert_eq!(sub.labels(), vec![1, 3, 4]);
        assert_eq!(sub.offset_of(3), Some(1));

        // a subset of a subset keeps the original labels
        let sub2 = sub.isubset(&[2]).unwrap();
        assert_eq!(sub2.labels(), vec![4]);
        assert_eq!(idx.positions_of(&sub2).unwrap(), vec![4]);
    }

    #[test]
    fn test_mask_length_mismatch() {
        let idx = RowIndex::identity(3);
        assert!(matches!(
            idx.isubset_mask(&[true]),
            Err(AnnoError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        assert!(RowIndex::from_labels(vec![1, 1]).is_err());
    }
}
