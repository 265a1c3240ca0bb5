//! One-dimensional weighted histogram.

use serde::Deserialize;

use crate::error::{Error, Result};

use super::FillWeight;

/// Handling of values outside the binned range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowPolicy {
    /// Record outside values in `underflow`/`overflow` only.
    #[default]
    Drop,
    /// Also add underflow to the first bin and overflow to the last bin.
    Fold,
}

/// Weighted 1D histogram over one observable.
///
/// An optional `selection` applies on top of the dataset/region selection.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    /// Observable expression.
    pub observable: String,
    /// Per-histogram selection expression.
    pub selection: Option<String>,
    /// Bin edges (sorted, length = number of bins + 1).
    pub bin_edges: Vec<f64>,
    /// Sum of weights per bin.
    pub content: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Sum of weights below the first edge.
    pub underflow: f64,
    /// Sum of weights at or above the last edge.
    pub overflow: f64,
    /// Number of values binned (including folded ones).
    pub entries: u64,
    /// Under/overflow policy.
    pub flow: FlowPolicy,
}

impl Histogram {
    /// Create a histogram with explicit bin edges.
    pub fn new(
        name: impl Into<String>,
        observable: impl Into<String>,
        bin_edges: Vec<f64>,
    ) -> Result<Self> {
        let name = name.into();
        validate_edges(&name, &bin_edges)?;
        let n_bins = bin_edges.len() - 1;
        Ok(Self {
            name,
            observable: observable.into(),
            selection: None,
            bin_edges,
            content: vec![0.0; n_bins],
            sumw2: vec![0.0; n_bins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
            flow: FlowPolicy::Drop,
        })
    }

    /// Create a histogram with `n_bins` equal-width bins on `[low, high)`.
    pub fn uniform(
        name: impl Into<String>,
        observable: impl Into<String>,
        n_bins: usize,
        low: f64,
        high: f64,
    ) -> Result<Self> {
        Self::new(name, observable, uniform_edges(n_bins, low, high)?)
    }

    /// Attach a per-histogram selection.
    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    /// Set the under/overflow policy.
    pub fn with_flow(mut self, flow: FlowPolicy) -> Self {
        self.flow = flow;
        self
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.content.len()
    }

    /// Sum of in-range bin contents.
    pub fn integral(&self) -> f64 {
        self.content.iter().sum()
    }

    /// Fill `values`, each with its weight (1 when `weight` is `None`).
    pub fn fill(&mut self, values: &[f64], weight: Option<&FillWeight>) -> Result<()> {
        if let Some(FillWeight::PerEntry(w)) = weight
            && w.len() != values.len()
        {
            return Err(Error::Validation(format!(
                "histogram '{}': {} weights for {} values",
                self.name,
                w.len(),
                values.len()
            )));
        }
        for (i, &val) in values.iter().enumerate() {
            let w = weight.map(|w| w.at(i)).unwrap_or(1.0);
            self.fill_one(val, w);
        }
        Ok(())
    }

    fn fill_one(&mut self, val: f64, w: f64) {
        if val.is_nan() {
            return;
        }
        let last = self.n_bins() - 1;
        let bin = match locate(&self.bin_edges, val) {
            Bin::In(b) => b,
            Bin::Under => {
                self.underflow += w;
                if self.flow == FlowPolicy::Drop {
                    return;
                }
                0
            }
            Bin::Over => {
                self.overflow += w;
                if self.flow == FlowPolicy::Drop {
                    return;
                }
                last
            }
        };
        self.content[bin] += w;
        self.sumw2[bin] += w * w;
        self.entries += 1;
    }
}

pub(crate) enum Bin {
    Under,
    In(usize),
    Over,
}

/// Bin of `val` in sorted `edges`; bins are closed on the left.
pub(crate) fn locate(edges: &[f64], val: f64) -> Bin {
    let n = edges.len();
    if val < edges[0] {
        return Bin::Under;
    }
    if val >= edges[n - 1] {
        return Bin::Over;
    }
    // First edge strictly greater than val, minus one.
    let upper = edges.partition_point(|&e| e <= val);
    Bin::In(upper - 1)
}

pub(crate) fn validate_edges(name: &str, edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Validation(format!("'{name}': need at least two bin edges")));
    }
    if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::Validation(format!(
            "'{name}': bin edges must be finite and strictly increasing"
        )));
    }
    Ok(())
}

/// Edges of `n_bins` equal-width bins on `[low, high)`.
pub fn uniform_edges(n_bins: usize, low: f64, high: f64) -> Result<Vec<f64>> {
    if n_bins == 0 || !low.is_finite() || !high.is_finite() || low >= high {
        return Err(Error::Validation(format!(
            "invalid uniform binning: {n_bins} bins on [{low}, {high})"
        )));
    }
    let width = (high - low) / n_bins as f64;
    let mut edges: Vec<f64> = (0..n_bins).map(|i| low + width * i as f64).collect();
    edges.push(high);
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hist() -> Histogram {
        Histogram::new("h", "x", vec![0.0, 1.0, 2.0, 3.0]).unwrap()
    }

    #[test]
    fn fills_with_drop_policy() {
        let mut h = hist();
        h.fill(&[0.5, 1.5, 2.5, 0.5, -1.0, 3.5], None).unwrap();
        assert_eq!(h.content, vec![2.0, 1.0, 1.0]);
        assert_eq!(h.underflow, 1.0);
        assert_eq!(h.overflow, 1.0);
        assert_eq!(h.entries, 4);
    }

    #[test]
    fn fold_policy_moves_flow_into_edge_bins() {
        let mut h = hist().with_flow(FlowPolicy::Fold);
        h.fill(&[-5.0, 0.5, 3.0, 99.0], Some(&FillWeight::Constant(2.0))).unwrap();
        assert_eq!(h.content, vec![4.0, 0.0, 4.0]);
        assert_eq!(h.sumw2, vec![8.0, 0.0, 8.0]);
        assert_eq!(h.underflow, 2.0);
        assert_eq!(h.overflow, 4.0);
        assert_eq!(h.entries, 4);
    }

    #[test]
    fn per_entry_weights_and_sumw2() {
        let mut h = hist();
        h.fill(&[0.1, 0.2, 2.9], Some(&FillWeight::PerEntry(vec![0.5, 1.5, -1.0]))).unwrap();
        assert_relative_eq!(h.content[0], 2.0);
        assert_relative_eq!(h.sumw2[0], 2.5);
        assert_relative_eq!(h.content[2], -1.0);
        assert_relative_eq!(h.integral(), 1.0);
    }

    #[test]
    fn weight_length_mismatch_rejected() {
        let mut h = hist();
        let err = h.fill(&[0.1, 0.2], Some(&FillWeight::PerEntry(vec![1.0]))).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn edges_are_left_closed_and_nan_is_skipped() {
        let mut h = hist();
        h.fill(&[1.0, 2.0, f64::NAN], None).unwrap();
        assert_eq!(h.content, vec![0.0, 1.0, 1.0]);
        assert_eq!(h.entries, 2);
    }

    #[test]
    fn uniform_binning() {
        let h = Histogram::uniform("h", "x", 4, 0.0, 2.0).unwrap();
        assert_eq!(h.bin_edges, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert!(Histogram::uniform("h", "x", 0, 0.0, 1.0).is_err());
        assert!(Histogram::uniform("h", "x", 3, 1.0, 1.0).is_err());
        assert!(Histogram::new("h", "x", vec![0.0, 0.0, 1.0]).is_err());
    }
}
