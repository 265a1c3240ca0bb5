//! Two-dimensional weighted histogram.

use crate::error::{Error, Result};

use super::FillWeight;
use super::histogram::{Bin, locate, validate_edges};

/// Weighted 2D histogram; contents are row-major with `x` as the row index.
#[derive(Debug, Clone)]
pub struct Histogram2D {
    /// Histogram name.
    pub name: String,
    /// X observable expression.
    pub x: String,
    /// Y observable expression.
    pub y: String,
    /// X bin edges.
    pub x_edges: Vec<f64>,
    /// Y bin edges.
    pub y_edges: Vec<f64>,
    /// Sum of weights per cell.
    pub content: Vec<f64>,
    /// Sum of squared weights per cell.
    pub sumw2: Vec<f64>,
    /// Sum of weights of points outside the binned area.
    pub out_of_range: f64,
    /// Number of points binned.
    pub entries: u64,
}

impl Histogram2D {
    /// Create an empty 2D histogram.
    pub fn new(
        name: impl Into<String>,
        x: impl Into<String>,
        y: impl Into<String>,
        x_edges: Vec<f64>,
        y_edges: Vec<f64>,
    ) -> Result<Self> {
        let name = name.into();
        validate_edges(&name, &x_edges)?;
        validate_edges(&name, &y_edges)?;
        let cells = (x_edges.len() - 1) * (y_edges.len() - 1);
        Ok(Self {
            name,
            x: x.into(),
            y: y.into(),
            x_edges,
            y_edges,
            content: vec![0.0; cells],
            sumw2: vec![0.0; cells],
            out_of_range: 0.0,
            entries: 0,
        })
    }

    /// Number of (x, y) bins.
    pub fn shape(&self) -> (usize, usize) {
        (self.x_edges.len() - 1, self.y_edges.len() - 1)
    }

    /// Content of cell `(ix, iy)`.
    pub fn at(&self, ix: usize, iy: usize) -> f64 {
        self.content[ix * self.shape().1 + iy]
    }

    /// Fill paired points.
    pub fn fill(&mut self, x: &[f64], y: &[f64], weight: Option<&FillWeight>) -> Result<()> {
        if x.len() != y.len() {
            return Err(Error::Validation(format!(
                "histogram2d '{}': {} x values but {} y values",
                self.name,
                x.len(),
                y.len()
            )));
        }
        if let Some(FillWeight::PerEntry(w)) = weight
            && w.len() != x.len()
        {
            return Err(Error::Validation(format!(
                "histogram2d '{}': {} weights for {} points",
                self.name,
                w.len(),
                x.len()
            )));
        }
        let ny = self.shape().1;
        for (i, (&xv, &yv)) in x.iter().zip(y).enumerate() {
            if xv.is_nan() || yv.is_nan() {
                continue;
            }
            let w = weight.map(|w| w.at(i)).unwrap_or(1.0);
            match (locate(&self.x_edges, xv), locate(&self.y_edges, yv)) {
                (Bin::In(ix), Bin::In(iy)) => {
                    let cell = ix * ny + iy;
                    self.content[cell] += w;
                    self.sumw2[cell] += w * w;
                    self.entries += 1;
                }
                _ => self.out_of_range += w,
            }
        }
        Ok(())
    }
}
