//! Sample-collecting and running-average graphs.

use ssrl_ntuple::Column;

use crate::error::{Error, Result};

/// Default number of fill calls a [`SampleGraph`] accepts.
pub const DEFAULT_GRAPH_CAPACITY: usize = 20;

/// Collects raw (x, y) samples, one entry per selected event.
///
/// At most `capacity` fill calls are stored. The first call after that sets
/// `reach_limit`, which stays set; later calls are dropped.
#[derive(Debug, Clone)]
pub struct SampleGraph {
    /// Graph name.
    pub name: String,
    /// X observable expression.
    pub x: String,
    /// Y observable expression.
    pub y: String,
    /// X axis label.
    pub xtitle: String,
    /// Y axis label.
    pub ytitle: String,
    /// Maximum number of accepted fill calls.
    pub capacity: usize,
    /// Store one flattened sample per fill call instead of one per event.
    pub flatten: bool,
    /// Latched once a fill call arrives with the graph full.
    pub reach_limit: bool,
    /// Stored x samples.
    pub xdata: Vec<Vec<f64>>,
    /// Stored y samples.
    pub ydata: Vec<Vec<f64>>,
    fills: usize,
}

impl SampleGraph {
    /// Create an empty graph with the default capacity.
    pub fn new(name: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        let x = x.into();
        let y = y.into();
        Self {
            name: name.into(),
            xtitle: x.clone(),
            ytitle: y.clone(),
            x,
            y,
            capacity: DEFAULT_GRAPH_CAPACITY,
            flatten: false,
            reach_limit: false,
            xdata: Vec::new(),
            ydata: Vec::new(),
            fills: 0,
        }
    }

    /// Set the capacity in fill calls.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set axis labels.
    pub fn with_titles(mut self, xtitle: impl Into<String>, ytitle: impl Into<String>) -> Self {
        self.xtitle = xtitle.into();
        self.ytitle = ytitle.into();
        self
    }

    /// Enable flatten-before-fill.
    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    /// Number of stored samples.
    pub fn ndata(&self) -> usize {
        self.xdata.len()
    }

    /// Number of accepted fill calls.
    pub fn fills(&self) -> usize {
        self.fills
    }

    /// Store the samples of one fill call.
    pub fn fill(&mut self, x: &Column, y: &Column) -> Result<()> {
        if self.reach_limit {
            return Ok(());
        }
        if self.fills >= self.capacity {
            self.reach_limit = true;
            return Ok(());
        }
        check_events(&self.name, x, y)?;
        if self.flatten {
            self.xdata.push(x.flatten());
            self.ydata.push(y.flatten());
        } else {
            for i in 0..x.n_events() {
                self.xdata.push(x.event(i).to_vec());
                self.ydata.push(y.event(i).to_vec());
            }
        }
        self.fills += 1;
        Ok(())
    }
}

/// Running elementwise sums of x and y plus a sample count.
///
/// By default every event contributes one row and rows are summed position by
/// position, so all rows must have the same width. With `flatten` each fill
/// call is reduced to its flat values, summed into a single running total.
#[derive(Debug, Clone)]
pub struct AvgGraph {
    /// Graph name.
    pub name: String,
    /// X observable expression.
    pub x: String,
    /// Y observable expression.
    pub y: String,
    /// Reduce each fill call to flat values before summing.
    pub flatten: bool,
    /// Running x sums.
    pub xsum: Vec<f64>,
    /// Running y sums.
    pub ysum: Vec<f64>,
    /// Number of rows (or flat values) summed.
    pub count: u64,
}

impl AvgGraph {
    /// Create an empty running-average graph.
    pub fn new(name: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            x: x.into(),
            y: y.into(),
            flatten: false,
            xsum: Vec::new(),
            ysum: Vec::new(),
            count: 0,
        }
    }

    /// Enable flatten-before-fill.
    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    /// Accumulate one fill call.
    pub fn fill(&mut self, x: &Column, y: &Column) -> Result<()> {
        check_events(&self.name, x, y)?;
        if self.flatten {
            let xs = x.flatten();
            let ys = y.flatten();
            if xs.len() != ys.len() {
                return Err(Error::Validation(format!(
                    "avg graph '{}': {} x values but {} y values",
                    self.name,
                    xs.len(),
                    ys.len()
                )));
            }
            add_into(&mut self.xsum, &[xs.iter().sum()]);
            add_into(&mut self.ysum, &[ys.iter().sum()]);
            self.count += xs.len() as u64;
            return Ok(());
        }
        let xrow = column_sum(&self.name, x, self.xsum.len())?;
        let yrow = column_sum(&self.name, y, self.ysum.len())?;
        if let Some(xrow) = xrow {
            add_into(&mut self.xsum, &xrow);
        }
        if let Some(yrow) = yrow {
            add_into(&mut self.ysum, &yrow);
        }
        self.count += x.n_events() as u64;
        Ok(())
    }

    /// Running averages `(xsum / count, ysum / count)`; `None` before any fill.
    pub fn mean(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some((
            self.xsum.iter().map(|v| v / n).collect(),
            self.ysum.iter().map(|v| v / n).collect(),
        ))
    }
}

fn check_events(name: &str, x: &Column, y: &Column) -> Result<()> {
    if x.n_events() != y.n_events() {
        return Err(Error::Validation(format!(
            "graph '{name}': {} x events but {} y events",
            x.n_events(),
            y.n_events()
        )));
    }
    Ok(())
}

/// Sum the rows of `col` position by position; `None` for zero events.
fn column_sum(name: &str, col: &Column, width: usize) -> Result<Option<Vec<f64>>> {
    let n = col.n_events();
    if n == 0 {
        return Ok(None);
    }
    let expected = if width == 0 { col.event(0).len() } else { width };
    let mut out = vec![0.0; expected];
    for i in 0..n {
        let row = col.event(i);
        if row.len() != expected {
            return Err(Error::Validation(format!(
                "avg graph '{name}': row of {} values where {expected} expected",
                row.len()
            )));
        }
        for (acc, v) in out.iter_mut().zip(row) {
            *acc += v;
        }
    }
    Ok(Some(out))
}

fn add_into(acc: &mut Vec<f64>, row: &[f64]) {
    if acc.is_empty() {
        acc.extend_from_slice(row);
    } else {
        for (a, v) in acc.iter_mut().zip(row) {
            *a += v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ssrl_ntuple::Jagged;

    fn ragged(rows: &[&[f64]]) -> Column {
        Column::Ragged(Jagged::from_rows(rows.iter().copied()))
    }

    #[test]
    fn graph_stores_one_sample_per_event() {
        let mut g = SampleGraph::new("g", "t", "amp");
        g.fill(&ragged(&[&[1.0, 2.0], &[3.0]]), &ragged(&[&[10.0, 20.0], &[30.0]])).unwrap();
        assert_eq!(g.ndata(), 2);
        assert_eq!(g.xdata[1], vec![3.0]);
        assert_eq!(g.ydata[0], vec![10.0, 20.0]);
        assert_eq!(g.fills(), 1);
        assert_eq!(g.xtitle, "t");
    }

    #[test]
    fn graph_flatten_stores_one_sample_per_call() {
        let mut g = SampleGraph::new("g", "t", "amp").with_flatten(true);
        g.fill(&ragged(&[&[1.0, 2.0], &[3.0]]), &ragged(&[&[4.0, 5.0], &[6.0]])).unwrap();
        assert_eq!(g.ndata(), 1);
        assert_eq!(g.xdata[0], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn graph_latches_once_full() {
        let mut g = SampleGraph::new("g", "x", "y").with_capacity(2);
        let x = Column::Flat(vec![1.0]);
        g.fill(&x, &x).unwrap();
        g.fill(&x, &x).unwrap();
        assert!(!g.reach_limit);
        g.fill(&x, &x).unwrap();
        assert!(g.reach_limit);
        for _ in 0..3 {
            g.fill(&x, &x).unwrap();
            assert_eq!(g.ndata(), 2);
            assert!(g.reach_limit);
        }
    }

    #[test]
    fn zero_capacity_latches_on_first_call() {
        let mut g = SampleGraph::new("g", "x", "y").with_capacity(0);
        let x = Column::Flat(vec![1.0]);
        g.fill(&x, &x).unwrap();
        assert!(g.reach_limit);
        assert_eq!(g.ndata(), 0);
    }

    #[test]
    fn avg_graph_sums_rows_elementwise() {
        let mut g = AvgGraph::new("a", "t", "amp");
        g.fill(&ragged(&[&[0.0, 1.0], &[0.0, 1.0]]), &ragged(&[&[2.0, 4.0], &[4.0, 8.0]])).unwrap();
        assert_eq!(g.xsum, vec![0.0, 2.0]);
        assert_eq!(g.ysum, vec![6.0, 12.0]);
        assert_eq!(g.count, 2);
        let (_, ymean) = g.mean().unwrap();
        assert_relative_eq!(ymean[1], 6.0);
    }

    #[test]
    fn avg_graph_sum_is_associative_over_chunks() {
        let a = ragged(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = ragged(&[&[5.0, 6.0]]);
        let both = ragged(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);

        let mut split = AvgGraph::new("a", "x", "y");
        split.fill(&a, &a).unwrap();
        split.fill(&b, &b).unwrap();
        let mut once = AvgGraph::new("a", "x", "y");
        once.fill(&both, &both).unwrap();

        assert_eq!(split.xsum, once.xsum);
        assert_eq!(split.ysum, once.ysum);
        assert_eq!(split.count, once.count);
    }

    #[test]
    fn avg_graph_rejects_inconsistent_width() {
        let mut g = AvgGraph::new("a", "x", "y");
        g.fill(&ragged(&[&[1.0, 2.0]]), &ragged(&[&[1.0, 2.0]])).unwrap();
        let err = g.fill(&ragged(&[&[1.0]]), &ragged(&[&[1.0]])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn avg_graph_flatten_keeps_scalar_sums() {
        let mut g = AvgGraph::new("a", "x", "y").with_flatten(true);
        g.fill(&ragged(&[&[1.0, 2.0], &[3.0]]), &ragged(&[&[1.0, 1.0], &[1.0]])).unwrap();
        g.fill(&Column::Flat(vec![4.0]), &Column::Flat(vec![1.0])).unwrap();
        assert_eq!(g.xsum, vec![10.0]);
        assert_eq!(g.ysum, vec![4.0]);
        assert_eq!(g.count, 4);
        assert_eq!(g.mean().unwrap().0, vec![2.5]);
        assert!(AvgGraph::new("e", "x", "y").mean().is_none());
    }
}
