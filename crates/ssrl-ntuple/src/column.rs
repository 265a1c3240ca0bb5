//! Flat and ragged per-event arrays.
//!
//! Every event carries either exactly one value of a quantity ([`Array::Flat`])
//! or a variable number of sub-values such as hits ([`Array::Ragged`]). All
//! masking, flattening and broadcasting goes through a match on the two shapes,
//! so a per-element mask can never be applied to a per-event array by accident.

use crate::error::{NtupleError, Result};

/// Offsets-based ragged storage.
///
/// Row `i` spans `values[offsets[i]..offsets[i + 1]]`; `offsets.len() == n_rows + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Jagged<T> {
    /// All values of all rows, back to back.
    pub values: Vec<T>,
    /// Row boundaries into `values`.
    pub offsets: Vec<usize>,
}

impl<T: Copy> Jagged<T> {
    /// Build from raw parts, validating the offsets.
    pub fn new(values: Vec<T>, offsets: Vec<usize>) -> Result<Self> {
        if offsets.is_empty() {
            return Err(NtupleError::Shape("ragged offsets must start with 0".into()));
        }
        if offsets[0] != 0 || offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(NtupleError::Shape("ragged offsets must be non-decreasing from 0".into()));
        }
        let last = offsets[offsets.len() - 1];
        if last != values.len() {
            return Err(NtupleError::Shape(format!(
                "ragged offsets end at {last} but {} values are stored",
                values.len()
            )));
        }
        Ok(Self { values, offsets })
    }

    /// Build from per-row slices.
    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[T]>,
    {
        let mut values = Vec::new();
        let mut offsets = vec![0];
        for row in rows {
            values.extend_from_slice(row.as_ref());
            offsets.push(values.len());
        }
        Self { values, offsets }
    }

    /// Number of rows (events).
    pub fn n_rows(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Values of row `i`.
    pub fn row(&self, i: usize) -> &[T] {
        &self.values[self.offsets[i]..self.offsets[i + 1]]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.offsets.windows(2).map(|w| &self.values[w[0]..w[1]])
    }

    /// True when both arrays have identical row structure.
    pub fn same_structure<U>(&self, other: &Jagged<U>) -> bool {
        self.offsets == other.offsets
    }

    /// Apply `f` to every value, keeping the row structure.
    pub fn map<U>(&self, f: impl Fn(T) -> U) -> Jagged<U> {
        let values = self.values.iter().map(|&v| f(v)).collect();
        Jagged { values, offsets: self.offsets.clone() }
    }

    fn filter_rows(&self, keep: &[bool]) -> Jagged<T> {
        Jagged::from_rows(self.rows().zip(keep).filter(|(_, k)| **k).map(|(r, _)| r))
    }

    fn filter_values(&self, keep: &Jagged<bool>) -> Jagged<T> {
        Jagged::from_rows(self.rows().zip(keep.rows()).map(|(row, k)| {
            row.iter().zip(k).filter(|(_, k)| **k).map(|(v, _)| *v).collect::<Vec<T>>()
        }))
    }

    fn slice_rows(&self, start: usize, stop: usize) -> Jagged<T> {
        let lo = self.offsets[start];
        let hi = self.offsets[stop];
        Jagged {
            values: self.values[lo..hi].to_vec(),
            offsets: self.offsets[start..=stop].iter().map(|o| o - lo).collect(),
        }
    }
}

/// A per-event array: one value per event, or a variable-length list per event.
#[derive(Debug, Clone, PartialEq)]
pub enum Array<T> {
    /// One value per event.
    Flat(Vec<T>),
    /// Variable-length list of values per event.
    Ragged(Jagged<T>),
}

/// Numeric event data.
pub type Column = Array<f64>;

/// Event (or sub-element) selection.
pub type Mask = Array<bool>;

impl<T: Copy> Array<T> {
    /// Number of events (outer length).
    pub fn n_events(&self) -> usize {
        match self {
            Array::Flat(v) => v.len(),
            Array::Ragged(j) => j.n_rows(),
        }
    }

    /// Whether the array holds per-event lists.
    pub fn is_ragged(&self) -> bool {
        matches!(self, Array::Ragged(_))
    }

    /// Number of leaf values (events for flat arrays, sub-elements for ragged ones).
    pub fn n_values(&self) -> usize {
        match self {
            Array::Flat(v) => v.len(),
            Array::Ragged(j) => j.values.len(),
        }
    }

    /// Copy all leaf values into a 1-D vector.
    pub fn flatten(&self) -> Vec<T> {
        match self {
            Array::Flat(v) => v.clone(),
            Array::Ragged(j) => j.values.clone(),
        }
    }

    /// Consume into a 1-D vector of leaf values.
    pub fn into_flat(self) -> Vec<T> {
        match self {
            Array::Flat(v) => v,
            Array::Ragged(j) => j.values,
        }
    }

    /// Apply `f` to every leaf value, keeping the shape.
    pub fn map<U>(&self, f: impl Fn(T) -> U) -> Array<U> {
        match self {
            Array::Flat(v) => Array::Flat(v.iter().map(|&x| f(x)).collect()),
            Array::Ragged(j) => Array::Ragged(j.map(f)),
        }
    }

    /// Values of event `i` as a slice (a single value for flat arrays).
    pub fn event(&self, i: usize) -> &[T] {
        match self {
            Array::Flat(v) => std::slice::from_ref(&v[i]),
            Array::Ragged(j) => j.row(i),
        }
    }

    /// Filter by a mask.
    ///
    /// A flat mask keeps or drops whole events; a ragged mask with the same row
    /// structure keeps or drops individual sub-elements (rows are kept, possibly
    /// emptied). A ragged mask cannot filter a flat array.
    pub fn select(&self, mask: &Mask) -> Result<Array<T>> {
        match (self, mask) {
            (_, Mask::Flat(keep)) => self.select_events(keep),
            (Array::Ragged(j), Mask::Ragged(m)) => {
                if !j.same_structure(m) {
                    return Err(NtupleError::Shape(
                        "ragged mask does not match the row structure of the data".into(),
                    ));
                }
                Ok(Array::Ragged(j.filter_values(m)))
            }
            (Array::Flat(_), Mask::Ragged(_)) => Err(NtupleError::Shape(
                "cannot apply a per-element mask to a per-event array".into(),
            )),
        }
    }

    /// Keep the events whose flag is set.
    pub fn select_events(&self, keep: &[bool]) -> Result<Array<T>> {
        if keep.len() != self.n_events() {
            return Err(NtupleError::Shape(format!(
                "event mask has {} entries but the array has {} events",
                keep.len(),
                self.n_events()
            )));
        }
        Ok(match self {
            Array::Flat(v) => {
                Array::Flat(v.iter().zip(keep).filter(|(_, k)| **k).map(|(x, _)| *x).collect())
            }
            Array::Ragged(j) => Array::Ragged(j.filter_rows(keep)),
        })
    }

    /// Reshape to the event structure of `shape`.
    ///
    /// A flat array repeats each event value once per sub-element of a ragged
    /// `shape`; otherwise the structures must already agree.
    pub fn broadcast_like<U: Copy>(&self, shape: &Array<U>) -> Result<Array<T>> {
        if self.n_events() != shape.n_events() {
            return Err(NtupleError::Shape(format!(
                "cannot broadcast {} events onto {} events",
                self.n_events(),
                shape.n_events()
            )));
        }
        match (self, shape) {
            (Array::Flat(_), Array::Flat(_)) => Ok(self.clone()),
            (Array::Flat(v), Array::Ragged(s)) => {
                let mut values = Vec::with_capacity(s.values.len());
                for (i, w) in s.offsets.windows(2).enumerate() {
                    values.extend(std::iter::repeat_n(v[i], w[1] - w[0]));
                }
                Ok(Array::Ragged(Jagged { values, offsets: s.offsets.clone() }))
            }
            (Array::Ragged(j), Array::Ragged(s)) if j.same_structure(s) => Ok(self.clone()),
            (Array::Ragged(_), _) => Err(NtupleError::Shape(
                "cannot broadcast a ragged array onto a different structure".into(),
            )),
        }
    }

    /// Events `start..stop`.
    pub fn slice(&self, start: usize, stop: usize) -> Array<T> {
        match self {
            Array::Flat(v) => Array::Flat(v[start..stop].to_vec()),
            Array::Ragged(j) => Array::Ragged(j.slice_rows(start, stop)),
        }
    }
}

impl Mask {
    /// Reduce to one flag per event: an event passes if any sub-element passes.
    pub fn any_per_event(&self) -> Vec<bool> {
        match self {
            Mask::Flat(v) => v.clone(),
            Mask::Ragged(j) => j.rows().map(|r| r.iter().any(|&b| b)).collect(),
        }
    }

    /// Number of passing leaf values.
    pub fn count_true(&self) -> usize {
        match self {
            Mask::Flat(v) => v.iter().filter(|&&b| b).count(),
            Mask::Ragged(j) => j.values.iter().filter(|&&b| b).count(),
        }
    }

    /// Logical AND, broadcasting a per-event mask over a per-element one.
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        let (lhs, rhs) = match (self, other) {
            (Mask::Flat(_), Mask::Ragged(_)) => (self.broadcast_like(other)?, other.clone()),
            (Mask::Ragged(_), Mask::Flat(_)) => (self.clone(), other.broadcast_like(self)?),
            _ => (self.clone(), other.broadcast_like(self)?),
        };
        Ok(match (lhs, rhs) {
            (Mask::Flat(a), Mask::Flat(b)) => {
                Mask::Flat(a.iter().zip(&b).map(|(x, y)| *x && *y).collect())
            }
            (Mask::Ragged(a), Mask::Ragged(b)) => Mask::Ragged(Jagged {
                values: a.values.iter().zip(&b.values).map(|(x, y)| *x && *y).collect(),
                offsets: a.offsets,
            }),
            _ => return Err(NtupleError::Shape("cannot combine flat and ragged masks".into())),
        })
    }
}

/// Whether any value is nonzero.
///
/// Used as the cheap "anything to fill?" guard; zero-valued data counts as empty.
pub fn any_nonzero(values: &[f64]) -> bool {
    values.iter().any(|&v| v != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits() -> Column {
        Column::Ragged(Jagged::from_rows([vec![1.0, 2.0], vec![], vec![3.0, 4.0, 5.0]]))
    }

    #[test]
    fn jagged_rejects_bad_offsets() {
        assert!(Jagged::new(vec![1.0, 2.0], vec![0, 3]).is_err());
        assert!(Jagged::new(vec![1.0, 2.0], vec![1, 2]).is_err());
        assert!(Jagged::<f64>::new(vec![], vec![]).is_err());
        let j = Jagged::new(vec![1.0, 2.0], vec![0, 0, 2]).unwrap();
        assert_eq!(j.n_rows(), 2);
        assert!(j.row(0).is_empty());
    }

    #[test]
    fn select_flat_with_flat_mask() {
        let x = Column::Flat(vec![-1.0, 2.0, 3.0]);
        let m = Mask::Flat(vec![false, true, true]);
        assert_eq!(x.select(&m).unwrap(), Column::Flat(vec![2.0, 3.0]));
    }

    #[test]
    fn select_ragged_with_flat_mask_drops_rows() {
        let m = Mask::Flat(vec![true, false, true]);
        let out = hits().select(&m).unwrap();
        assert_eq!(out.n_events(), 2);
        assert_eq!(out.flatten(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn select_ragged_with_ragged_mask_keeps_rows() {
        let m = hits().map(|v| v > 2.5);
        let out = hits().select(&m).unwrap();
        assert_eq!(out.n_events(), 3);
        assert_eq!(out.flatten(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn select_flat_with_ragged_mask_is_an_error() {
        let x = Column::Flat(vec![1.0, 2.0, 3.0]);
        let m = hits().map(|v| v > 0.0);
        assert!(matches!(x.select(&m), Err(NtupleError::Shape(_))));
    }

    #[test]
    fn select_events_checks_length() {
        let x = Column::Flat(vec![1.0, 2.0]);
        assert!(x.select_events(&[true]).is_err());
    }

    #[test]
    fn any_per_event_reduces_ragged() {
        let m = hits().map(|v| v > 4.5);
        assert_eq!(m.any_per_event(), vec![false, false, true]);
        assert_eq!(m.count_true(), 1);
    }

    #[test]
    fn broadcast_flat_over_ragged() {
        let w = Column::Flat(vec![10.0, 20.0, 30.0]);
        let b = w.broadcast_like(&hits()).unwrap();
        assert_eq!(b.flatten(), vec![10.0, 10.0, 30.0, 30.0, 30.0]);
        assert!(Column::Flat(vec![1.0]).broadcast_like(&hits()).is_err());
    }

    #[test]
    fn and_broadcasts_event_mask() {
        let per_event = Mask::Flat(vec![true, true, false]);
        let per_hit = hits().map(|v| v != 2.0);
        let both = per_event.and(&per_hit).unwrap();
        assert_eq!(both.flatten(), vec![true, false, false, false, false]);
        assert_eq!(per_hit.and(&per_event).unwrap(), both);
    }

    #[test]
    fn and_rejects_mismatched_masks() {
        let per_hit = hits().map(|v| v != 2.0);
        let other = Mask::Ragged(Jagged::from_rows([vec![true], vec![false], vec![true]]));
        assert!(matches!(per_hit.and(&other), Err(NtupleError::Shape(_))));
        let short = Mask::Flat(vec![true, false]);
        assert!(matches!(short.and(&per_hit), Err(NtupleError::Shape(_))));
        assert!(matches!(short.and(&Mask::Flat(vec![true])), Err(NtupleError::Shape(_))));
    }

    #[test]
    fn slice_rebases_offsets() {
        let s = hits().slice(1, 3);
        match s {
            Column::Ragged(j) => {
                assert_eq!(j.offsets, vec![0, 0, 3]);
                assert_eq!(j.values, vec![3.0, 4.0, 5.0]);
            }
            Column::Flat(_) => panic!("expected ragged slice"),
        }
    }

    #[test]
    fn any_nonzero_treats_zeros_as_empty() {
        assert!(!any_nonzero(&[]));
        assert!(!any_nonzero(&[0.0, -0.0]));
        assert!(any_nonzero(&[0.0, 1e-12]));
    }
}
