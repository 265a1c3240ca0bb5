//! YAML/JSON configuration of a histogramming run.
//!
//! ```yaml
//! step_size: 50000
//! default_weight: lumi_weight
//! datasets:
//!   - name: run42
//!     files: [run42.parquet]
//!     selection: "trigger > 0"
//!     regions:
//!       - name: signal
//!         selection: "amp[0] > 10"
//!         weights: [sf_amp, "0.5"]
//!         aggregators:
//!           - type: histogram
//!             name: energy
//!             observable: energy
//!             bins: { nbins: 100, low: 0.0, high: 50.0 }
//!           - type: graph
//!             name: waveform
//!             x: t
//!             y: amp
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use ssrl_ntuple::CompiledExpr;

use crate::aggregator::{
    Aggregator, AvgGraph, DEFAULT_GRAPH_CAPACITY, FlowPolicy, Histogram, Histogram2D, SampleGraph,
    uniform_edges,
};
use crate::dataset::{Dataset, Region, WeightSpec, WeightTerm};
use crate::error::{Error, Result};
use crate::stream::{DEFAULT_STEP_SIZE, DEFAULT_TREE_NAME, HistMaker};
use crate::termination::DEFAULT_TERMINATION_THRESHOLD;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistMakerConfig {
    /// Entries per chunk.
    #[serde(default = "default_step_size")]
    pub step_size: usize,
    /// Tree read when a dataset names none.
    #[serde(default = "default_tree_name")]
    pub tree_name: String,
    /// Weight applied when neither dataset nor region has one.
    #[serde(default)]
    pub default_weight: Option<String>,
    /// Apply `default_weight` on top of dataset/region weights.
    #[serde(default)]
    pub enforce_default_weight: bool,
    /// Columns always read.
    #[serde(default)]
    pub branch_list: Vec<String>,
    /// `new name: name on disk`.
    #[serde(default)]
    pub branch_rename: BTreeMap<String, String>,
    /// Stop once this many saturated-graph observations are exceeded.
    #[serde(default = "default_threshold")]
    pub early_termination_threshold: u64,
    /// Datasets, processed in order.
    pub datasets: Vec<DatasetConfig>,
}

fn default_step_size() -> usize {
    DEFAULT_STEP_SIZE
}

fn default_tree_name() -> String {
    DEFAULT_TREE_NAME.to_string()
}

fn default_threshold() -> u64 {
    DEFAULT_TERMINATION_THRESHOLD
}

fn default_capacity() -> usize {
    DEFAULT_GRAPH_CAPACITY
}

/// One dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name.
    pub name: String,
    /// Tree name override.
    #[serde(default)]
    pub tree_name: Option<String>,
    /// Input files.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Selection expression.
    #[serde(default)]
    pub selection: Option<String>,
    /// Dataset weight.
    #[serde(default)]
    pub weights: Option<WeightConfig>,
    /// Extra columns to read.
    #[serde(default)]
    pub branches: Vec<String>,
    /// Sub-regions.
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
}

/// One sub-region.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    /// Region name.
    pub name: String,
    /// Selection expression.
    #[serde(default)]
    pub selection: Option<String>,
    /// Region weight.
    #[serde(default)]
    pub weights: Option<WeightConfig>,
    /// Extra columns to read.
    #[serde(default)]
    pub branches: Vec<String>,
    /// Aggregators.
    #[serde(default)]
    pub aggregators: Vec<AggregatorConfig>,
}

/// A weight: number, expression/number text, or list of factors.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WeightConfig {
    /// Constant.
    Number(f64),
    /// Expression or numeric text.
    Text(String),
    /// Product of factors.
    List(Vec<WeightItem>),
}

/// One factor of a weight list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WeightItem {
    /// Constant.
    Number(f64),
    /// Column name or numeric text.
    Text(String),
}

impl From<WeightConfig> for WeightSpec {
    fn from(w: WeightConfig) -> Self {
        match w {
            WeightConfig::Number(v) => WeightSpec::Literal(v),
            WeightConfig::Text(t) => WeightSpec::parse(&t),
            WeightConfig::List(items) => WeightSpec::Product(
                items
                    .into_iter()
                    .map(|i| match i {
                        WeightItem::Number(v) => WeightTerm::Literal(v),
                        WeightItem::Text(t) => WeightTerm::parse(&t),
                    })
                    .collect(),
            ),
        }
    }
}

/// Histogram binning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BinningConfig {
    /// Equal-width bins on `[low, high)`.
    Uniform {
        /// Number of bins.
        nbins: usize,
        /// Lower edge.
        low: f64,
        /// Upper edge.
        high: f64,
    },
    /// Explicit edges.
    Edges {
        /// Sorted bin edges.
        edges: Vec<f64>,
    },
}

impl BinningConfig {
    /// Bin edges.
    pub fn edges(&self) -> Result<Vec<f64>> {
        match self {
            BinningConfig::Uniform { nbins, low, high } => uniform_edges(*nbins, *low, *high),
            BinningConfig::Edges { edges } => Ok(edges.clone()),
        }
    }
}

/// Aggregator declaration, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregatorConfig {
    /// 1D histogram.
    Histogram {
        /// Name.
        name: String,
        /// Observable expression.
        observable: String,
        /// Binning.
        bins: BinningConfig,
        /// Per-histogram selection.
        #[serde(default)]
        selection: Option<String>,
        /// Under/overflow policy.
        #[serde(default)]
        flow: FlowPolicy,
    },
    /// 2D histogram.
    #[serde(rename = "histogram2d")]
    Histogram2D {
        /// Name.
        name: String,
        /// X expression.
        x: String,
        /// Y expression.
        y: String,
        /// X binning.
        xbins: BinningConfig,
        /// Y binning.
        ybins: BinningConfig,
    },
    /// Capped sample graph.
    Graph {
        /// Name.
        name: String,
        /// X expression.
        x: String,
        /// Y expression.
        y: String,
        /// X label (defaults to `x`).
        #[serde(default)]
        xtitle: Option<String>,
        /// Y label (defaults to `y`).
        #[serde(default)]
        ytitle: Option<String>,
        /// Accepted fill calls.
        #[serde(default = "default_capacity")]
        capacity: usize,
        /// Store one flattened sample per fill call.
        #[serde(default)]
        flatten: bool,
    },
    /// Running-average graph.
    AvgGraph {
        /// Name.
        name: String,
        /// X expression.
        x: String,
        /// Y expression.
        y: String,
        /// Reduce each fill call to flat values.
        #[serde(default)]
        flatten: bool,
    },
}

impl AggregatorConfig {
    /// Build the aggregator.
    pub fn build(&self) -> Result<Aggregator> {
        Ok(match self {
            AggregatorConfig::Histogram { name, observable, bins, selection, flow } => {
                let mut h = Histogram::new(name, observable, bins.edges()?)?.with_flow(*flow);
                if let Some(sel) = selection {
                    h = h.with_selection(sel);
                }
                h.into()
            }
            AggregatorConfig::Histogram2D { name, x, y, xbins, ybins } => {
                Histogram2D::new(name, x, y, xbins.edges()?, ybins.edges()?)?.into()
            }
            AggregatorConfig::Graph { name, x, y, xtitle, ytitle, capacity, flatten } => {
                SampleGraph::new(name, x, y)
                    .with_titles(xtitle.as_deref().unwrap_or(x), ytitle.as_deref().unwrap_or(y))
                    .with_capacity(*capacity)
                    .with_flatten(*flatten)
                    .into()
            }
            AggregatorConfig::AvgGraph { name, x, y, flatten } => {
                AvgGraph::new(name, x, y).with_flatten(*flatten).into()
            }
        })
    }
}

impl RegionConfig {
    /// Build the region, collecting its branches.
    pub fn build(&self) -> Result<Region> {
        let mut region = Region::new(&self.name);
        region.selection = self.selection.clone();
        region.weight = self.weights.clone().map(WeightSpec::from);
        region.ntuple_branches.extend(self.branches.iter().cloned());
        let mut names = BTreeSet::new();
        for agg in &self.aggregators {
            let agg = agg.build()?;
            if !names.insert(agg.name().to_string()) {
                return Err(Error::Validation(format!(
                    "region '{}': duplicate aggregator '{}'",
                    self.name,
                    agg.name()
                )));
            }
            region.aggregators.push(agg);
        }
        region.collect_branches()?;
        Ok(region)
    }
}

impl DatasetConfig {
    /// Build the dataset, collecting branches of it and its regions.
    pub fn build(&self) -> Result<Dataset> {
        let mut dataset = Dataset::new(&self.name);
        dataset.tree_name = self.tree_name.clone();
        dataset.files = self.files.clone();
        dataset.selection = self.selection.clone();
        dataset.weight = self.weights.clone().map(WeightSpec::from);
        dataset.ntuple_branches.extend(self.branches.iter().cloned());
        let mut names = BTreeSet::new();
        for r in &self.regions {
            if !names.insert(r.name.as_str()) {
                return Err(Error::Validation(format!(
                    "dataset '{}': duplicate region '{}'",
                    self.name, r.name
                )));
            }
            dataset.regions.push(r.build()?);
        }
        dataset.collect_branches()?;
        Ok(dataset)
    }
}

impl HistMakerConfig {
    /// Parse YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Parse JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate, compile every expression once, and build the maker and datasets.
    pub fn build(&self) -> Result<(HistMaker, Vec<Dataset>)> {
        if self.step_size == 0 {
            return Err(Error::Validation("step_size must be positive".into()));
        }
        if let Some(w) = self.default_weight.as_deref().filter(|w| !w.trim().is_empty()) {
            CompiledExpr::compile(w)?;
        }
        let maker = HistMaker {
            step_size: self.step_size,
            tree_name: self.tree_name.clone(),
            default_weight: self.default_weight.clone(),
            enforce_default_weight: self.enforce_default_weight,
            branch_list: self.branch_list.iter().cloned().collect(),
            branch_rename: self.branch_rename.clone(),
            termination_threshold: self.early_termination_threshold,
        };
        let datasets = self.datasets.iter().map(DatasetConfig::build).collect::<Result<Vec<_>>>()?;
        tracing::debug!(datasets = datasets.len(), "configuration built");
        Ok((maker, datasets))
    }
}

/// Read a configuration file: `.json` as JSON, anything else as YAML.
pub fn read_config(path: &Path) -> Result<HistMakerConfig> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: HistMakerConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml_ng::from_slice(&bytes)?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregatorKind;

    const YAML: &str = r#"
step_size: 10
datasets:
  - name: run1
    selection: "trigger > 0"
    weights: [lumi, 2]
    regions:
      - name: all
        weights: "2.5"
        aggregators:
          - type: histogram
            name: e
            observable: energy
            bins: { nbins: 4, low: 0, high: 4 }
            selection: "energy > 1"
            flow: fold
          - type: histogram2d
            name: e_vs_t
            x: energy
            y: t
            xbins: { edges: [0, 1, 2] }
            ybins: { nbins: 2, low: 0, high: 1 }
          - type: graph
            name: wave
            x: t
            y: amp
            capacity: 5
          - type: avg_graph
            name: avg
            x: t
            y: amp
            flatten: true
"#;

    #[test]
    fn yaml_builds_every_aggregator_kind() {
        let cfg = HistMakerConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(cfg.tree_name, "events");
        assert_eq!(cfg.early_termination_threshold, 20);
        let (maker, datasets) = cfg.build().unwrap();
        assert_eq!(maker.step_size, 10);

        let ds = &datasets[0];
        assert_eq!(
            ds.weight,
            Some(WeightSpec::Product(vec![
                WeightTerm::Name("lumi".into()),
                WeightTerm::Literal(2.0)
            ]))
        );
        let region = &ds.regions[0];
        assert_eq!(region.weight, Some(WeightSpec::Literal(2.5)));
        let kinds: Vec<_> = region.aggregators.iter().map(Aggregator::kind).collect();
        assert_eq!(
            kinds,
            vec![
                AggregatorKind::SelectiveHistogram,
                AggregatorKind::Histogram2D,
                AggregatorKind::Graph,
                AggregatorKind::AvgGraph
            ]
        );
        let Aggregator::Graph(g) = &region.aggregators[2] else { panic!("not a graph") };
        assert_eq!(g.capacity, 5);
        assert_eq!(g.xtitle, "t");
        assert!(region.ntuple_branches.contains("amp"));
        assert!(ds.ntuple_branches.contains("lumi"));
    }

    #[test]
    fn unknown_aggregator_type_fails() {
        let text = r#"
datasets:
  - name: d
    regions:
      - name: r
        aggregators:
          - type: profile
            name: p
"#;
        assert!(matches!(HistMakerConfig::from_yaml_str(text), Err(Error::Yaml(_))));
    }

    #[test]
    fn malformed_expression_fails_build() {
        let text = r#"{"datasets": [{"name": "d", "selection": "x >"}]}"#;
        let cfg = HistMakerConfig::from_json_str(text).unwrap();
        assert!(matches!(cfg.build(), Err(Error::Ntuple(_))));
    }

    #[test]
    fn duplicate_region_names_rejected() {
        let text = r#"{"datasets": [{"name": "d", "regions": [{"name": "r"}, {"name": "r"}]}]}"#;
        let cfg = HistMakerConfig::from_json_str(text).unwrap();
        assert!(matches!(cfg.build(), Err(Error::Validation(_))));
    }
}
