//! Aggregators: stateful accumulators fed by the chunk dispatcher.
//!
//! Each variant owns its state exclusively. The dispatcher switches on
//! [`Aggregator::kind`] and feeds one [`FillInput`] per chunk through
//! [`Aggregator::update`].

pub mod graph;
pub mod histogram;
pub mod histogram2d;

use ssrl_ntuple::Column;

use crate::error::{Error, Result};

pub use graph::{AvgGraph, DEFAULT_GRAPH_CAPACITY, SampleGraph};
pub use histogram::{FlowPolicy, Histogram, uniform_edges};
pub use histogram2d::Histogram2D;

/// Variant tag the dispatcher switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregatorKind {
    /// 1D histogram without its own selection.
    Histogram,
    /// 1D histogram with an attached selection.
    SelectiveHistogram,
    /// 2D histogram.
    Histogram2D,
    /// Capped raw-sample graph.
    Graph,
    /// Running-average graph.
    AvgGraph,
}

impl AggregatorKind {
    /// Whether observable index errors skip the region instead of failing.
    pub fn is_graph(self) -> bool {
        matches!(self, AggregatorKind::Graph | AggregatorKind::AvgGraph)
    }
}

/// Observable expression(s) of an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observable<'a> {
    /// One expression.
    Single(&'a str),
    /// An (x, y) pair.
    Pair(&'a str, &'a str),
}

/// Weight of one fill call.
#[derive(Debug, Clone, PartialEq)]
pub enum FillWeight {
    /// Same weight for every entry.
    Constant(f64),
    /// One weight per entry.
    PerEntry(Vec<f64>),
}

impl FillWeight {
    /// Weight of entry `i`.
    pub fn at(&self, i: usize) -> f64 {
        match self {
            FillWeight::Constant(w) => *w,
            FillWeight::PerEntry(w) => w[i],
        }
    }
}

/// Data of one fill call.
#[derive(Debug, Clone, Copy)]
pub enum FillInput<'a> {
    /// Flat values for a 1D histogram.
    Values(&'a [f64]),
    /// Flat paired points for a 2D histogram.
    Points(&'a [f64], &'a [f64]),
    /// Selected events, kept per event, for graphs.
    Events(&'a Column, &'a Column),
}

/// A stateful accumulator.
#[derive(Debug, Clone)]
pub enum Aggregator {
    /// 1D histogram.
    Histogram(Histogram),
    /// 2D histogram.
    Histogram2D(Histogram2D),
    /// Capped raw-sample graph.
    Graph(SampleGraph),
    /// Running-average graph.
    AvgGraph(AvgGraph),
}

impl Aggregator {
    /// Aggregator name.
    pub fn name(&self) -> &str {
        match self {
            Aggregator::Histogram(h) => &h.name,
            Aggregator::Histogram2D(h) => &h.name,
            Aggregator::Graph(g) => &g.name,
            Aggregator::AvgGraph(g) => &g.name,
        }
    }

    /// Variant tag.
    pub fn kind(&self) -> AggregatorKind {
        match self {
            Aggregator::Histogram(h) if h.selection.is_some() => AggregatorKind::SelectiveHistogram,
            Aggregator::Histogram(_) => AggregatorKind::Histogram,
            Aggregator::Histogram2D(_) => AggregatorKind::Histogram2D,
            Aggregator::Graph(_) => AggregatorKind::Graph,
            Aggregator::AvgGraph(_) => AggregatorKind::AvgGraph,
        }
    }

    /// Observable expression(s).
    pub fn observable(&self) -> Observable<'_> {
        match self {
            Aggregator::Histogram(h) => Observable::Single(&h.observable),
            Aggregator::Histogram2D(h) => Observable::Pair(&h.x, &h.y),
            Aggregator::Graph(g) => Observable::Pair(&g.x, &g.y),
            Aggregator::AvgGraph(g) => Observable::Pair(&g.x, &g.y),
        }
    }

    /// Attached selection, for histograms that carry one.
    pub fn selection(&self) -> Option<&str> {
        match self {
            Aggregator::Histogram(h) => h.selection.as_deref(),
            _ => None,
        }
    }

    /// Every expression the aggregator evaluates.
    pub fn expressions(&self) -> Vec<&str> {
        let mut out = match self.observable() {
            Observable::Single(e) => vec![e],
            Observable::Pair(x, y) => vec![x, y],
        };
        out.extend(self.selection());
        out
    }

    /// Feed one fill call. Graphs ignore `weight`.
    pub fn update(&mut self, input: FillInput<'_>, weight: Option<&FillWeight>) -> Result<()> {
        match (self, input) {
            (Aggregator::Histogram(h), FillInput::Values(v)) => h.fill(v, weight),
            (Aggregator::Histogram2D(h), FillInput::Points(x, y)) => h.fill(x, y, weight),
            (Aggregator::Graph(g), FillInput::Events(x, y)) => g.fill(x, y),
            (Aggregator::AvgGraph(g), FillInput::Events(x, y)) => g.fill(x, y),
            (agg, _) => Err(Error::Validation(format!(
                "aggregator '{}' ({:?}) cannot take this input",
                agg.name(),
                agg.kind()
            ))),
        }
    }

    /// Whether a capped aggregator has latched its limit.
    pub fn reached_limit(&self) -> bool {
        match self {
            Aggregator::Graph(g) => g.reach_limit,
            _ => false,
        }
    }
}

impl From<Histogram> for Aggregator {
    fn from(h: Histogram) -> Self {
        Aggregator::Histogram(h)
    }
}

impl From<Histogram2D> for Aggregator {
    fn from(h: Histogram2D) -> Self {
        Aggregator::Histogram2D(h)
    }
}

impl From<SampleGraph> for Aggregator {
    fn from(g: SampleGraph) -> Self {
        Aggregator::Graph(g)
    }
}

impl From<AvgGraph> for Aggregator {
    fn from(g: AvgGraph) -> Self {
        Aggregator::AvgGraph(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_reflects_attached_selection() {
        let h = Histogram::uniform("h", "x", 2, 0.0, 2.0).unwrap();
        assert_eq!(Aggregator::from(h.clone()).kind(), AggregatorKind::Histogram);
        let sel = Aggregator::from(h.with_selection("y > 0"));
        assert_eq!(sel.kind(), AggregatorKind::SelectiveHistogram);
        assert_eq!(sel.expressions(), vec!["x", "y > 0"]);
    }

    #[test]
    fn update_rejects_mismatched_input() {
        let mut g = Aggregator::from(SampleGraph::new("g", "x", "y"));
        assert!(g.update(FillInput::Values(&[1.0]), None).is_err());
        let col = Column::Flat(vec![1.0]);
        g.update(FillInput::Events(&col, &col), None).unwrap();
        assert!(!g.reached_limit());
        assert_eq!(g.observable(), Observable::Pair("x", "y"));
    }

    #[test]
    fn only_graph_kinds_recover_index_errors() {
        assert!(Aggregator::from(SampleGraph::new("g", "x", "y")).kind().is_graph());
        assert!(Aggregator::from(AvgGraph::new("a", "x", "y")).kind().is_graph());
        assert!(!AggregatorKind::Histogram.is_graph());
        assert!(!AggregatorKind::SelectiveHistogram.is_graph());
        assert!(!AggregatorKind::Histogram2D.is_graph());
    }

    #[test]
    fn constant_weight_applies_to_every_entry() {
        assert_eq!(FillWeight::Constant(2.5).at(7), 2.5);
        assert_eq!(FillWeight::PerEntry(vec![1.0, 3.0]).at(1), 3.0);
    }
}
