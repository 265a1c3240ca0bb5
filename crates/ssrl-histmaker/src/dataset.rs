//! Datasets, their sub-regions, and weight specifications.

use std::collections::BTreeSet;
use std::path::PathBuf;

use ssrl_ntuple::CompiledExpr;

use crate::aggregator::Aggregator;
use crate::error::Result;

/// One factor of a [`WeightSpec::Product`].
#[derive(Debug, Clone, PartialEq)]
pub enum WeightTerm {
    /// Constant multiplier.
    Literal(f64),
    /// Column name (or expression, when no such column exists).
    Name(String),
}

impl WeightTerm {
    /// Parse one list element; finite numeric text becomes a literal.
    pub fn parse(text: &str) -> Self {
        match parse_literal(text) {
            Some(v) => WeightTerm::Literal(v),
            None => WeightTerm::Name(text.trim().to_string()),
        }
    }
}

/// How a dataset or region weights its events.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightSpec {
    /// A weight expression.
    Expression(String),
    /// A constant.
    Literal(f64),
    /// Product of the listed terms.
    Product(Vec<WeightTerm>),
}

impl WeightSpec {
    /// Parse a single weight string; finite numeric text becomes a literal.
    pub fn parse(text: &str) -> Self {
        match parse_literal(text) {
            Some(v) => WeightSpec::Literal(v),
            None => WeightSpec::Expression(text.trim().to_string()),
        }
    }

    /// Product of list elements.
    pub fn product<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        WeightSpec::Product(terms.into_iter().map(|t| WeightTerm::parse(t.as_ref())).collect())
    }

    /// Expressions that need evaluating (literals excluded).
    pub fn expressions(&self) -> Vec<&str> {
        match self {
            WeightSpec::Expression(e) => vec![e.as_str()],
            WeightSpec::Literal(_) => Vec::new(),
            WeightSpec::Product(terms) => terms
                .iter()
                .filter_map(|t| match t {
                    WeightTerm::Name(n) => Some(n.as_str()),
                    WeightTerm::Literal(_) => None,
                })
                .collect(),
        }
    }
}

fn parse_literal(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A named selection/weight/aggregator scope nested in a [`Dataset`].
#[derive(Debug, Clone)]
pub struct Region {
    /// Region name.
    pub name: String,
    /// Selection expression.
    pub selection: Option<String>,
    /// Region-level weight.
    pub weight: Option<WeightSpec>,
    /// Columns this region needs.
    pub ntuple_branches: BTreeSet<String>,
    /// Aggregators, filled in declaration order.
    pub aggregators: Vec<Aggregator>,
}

impl Region {
    /// Create a region with no selection, weight or aggregators.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selection: None,
            weight: None,
            ntuple_branches: BTreeSet::new(),
            aggregators: Vec::new(),
        }
    }

    /// Set the selection.
    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: WeightSpec) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Add an aggregator.
    pub fn with_aggregator(mut self, aggregator: impl Into<Aggregator>) -> Self {
        self.aggregators.push(aggregator.into());
        self
    }

    /// Look up an aggregator by name.
    pub fn aggregator(&self, name: &str) -> Option<&Aggregator> {
        self.aggregators.iter().find(|a| a.name() == name)
    }

    /// Add the branches of every region expression to `ntuple_branches`.
    ///
    /// Fails on the first malformed expression.
    pub fn collect_branches(&mut self) -> Result<()> {
        let mut exprs: Vec<&str> = Vec::new();
        exprs.extend(self.selection.as_deref());
        if let Some(w) = &self.weight {
            exprs.extend(w.expressions());
        }
        for agg in &self.aggregators {
            exprs.extend(agg.expressions());
        }
        let found = required_branches(&exprs)?;
        self.ntuple_branches.extend(found);
        Ok(())
    }
}

/// A source-level scope: input files, selection, weight and regions.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Dataset name.
    pub name: String,
    /// Tree to read; `None` uses the maker's default tree name.
    pub tree_name: Option<String>,
    /// Input files.
    pub files: Vec<PathBuf>,
    /// Selection expression.
    pub selection: Option<String>,
    /// Dataset-level weight.
    pub weight: Option<WeightSpec>,
    /// Columns the dataset-level expressions need.
    pub ntuple_branches: BTreeSet<String>,
    /// Sub-regions, processed in declaration order.
    pub regions: Vec<Region>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree_name: None,
            files: Vec::new(),
            selection: None,
            weight: None,
            ntuple_branches: BTreeSet::new(),
            regions: Vec::new(),
        }
    }

    /// Set the tree name.
    pub fn with_tree_name(mut self, tree_name: impl Into<String>) -> Self {
        self.tree_name = Some(tree_name.into());
        self
    }

    /// Add an input file.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Set the selection.
    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: WeightSpec) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Add a region.
    pub fn with_region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    /// Look up a region by name.
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Fill `ntuple_branches` of the dataset and all of its regions.
    pub fn collect_branches(&mut self) -> Result<()> {
        let mut exprs: Vec<&str> = Vec::new();
        exprs.extend(self.selection.as_deref());
        if let Some(w) = &self.weight {
            exprs.extend(w.expressions());
        }
        let found = required_branches(&exprs)?;
        self.ntuple_branches.extend(found);
        for region in &mut self.regions {
            region.collect_branches()?;
        }
        Ok(())
    }

    /// Union of the dataset's and every region's `ntuple_branches`.
    pub fn branch_union(&self) -> BTreeSet<String> {
        let mut all = self.ntuple_branches.clone();
        for r in &self.regions {
            all.extend(r.ntuple_branches.iter().cloned());
        }
        all
    }
}

/// Branches referenced by `exprs`, compiling each one.
pub(crate) fn required_branches(exprs: &[&str]) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for e in exprs {
        out.extend(CompiledExpr::compile(e)?.required_branches);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Histogram, SampleGraph};

    #[test]
    fn numeric_text_becomes_literal() {
        assert_eq!(WeightSpec::parse("2.5"), WeightSpec::Literal(2.5));
        assert_eq!(WeightSpec::parse(" 3 "), WeightSpec::Literal(3.0));
        assert_eq!(WeightSpec::parse("w*2"), WeightSpec::Expression("w*2".into()));
        assert_eq!(WeightSpec::parse("nan"), WeightSpec::Expression("nan".into()));
        assert_eq!(
            WeightSpec::product(["w1", "0.5"]),
            WeightSpec::Product(vec![WeightTerm::Name("w1".into()), WeightTerm::Literal(0.5)])
        );
    }

    #[test]
    fn branches_are_collected_from_every_expression() {
        let mut ds = Dataset::new("data")
            .with_selection("trigger > 0")
            .with_weight(WeightSpec::product(["lumi", "2"]))
            .with_region(
                Region::new("signal")
                    .with_selection("amp[0] > 10")
                    .with_weight(WeightSpec::parse("sf"))
                    .with_aggregator(Histogram::uniform("e", "energy", 10, 0.0, 1.0).unwrap())
                    .with_aggregator(SampleGraph::new("wave", "t", "amp")),
            );
        ds.collect_branches().unwrap();

        let expect: BTreeSet<String> = ["lumi", "trigger"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ds.ntuple_branches, expect);
        let region = ds.region("signal").unwrap();
        assert!(region.ntuple_branches.contains("sf"));
        assert!(region.ntuple_branches.contains("t"));
        assert_eq!(ds.branch_union().len(), 6);
        assert!(region.aggregator("wave").is_some());
    }

    #[test]
    fn malformed_expression_fails_collection() {
        let mut ds = Dataset::new("d").with_region(Region::new("r").with_selection("x >"));
        assert!(ds.collect_branches().is_err());
    }
}
