//! Stream controller: pulls chunks and drives composition and dispatch.

use std::collections::{BTreeMap, BTreeSet};

use ssrl_ntuple::{Chunk, EventTree, Evaluate, ExprCache, NtupleFile, ParquetFile};

use crate::compose::{compose_mask, compose_weight, evaluate_mask};
use crate::dataset::{Dataset, required_branches};
use crate::dispatch::{Dispatch, dispatch};
use crate::error::{Error, Result};
use crate::termination::{DEFAULT_TERMINATION_THRESHOLD, EarlyTermination};

/// Default number of entries per chunk.
pub const DEFAULT_STEP_SIZE: usize = 100_000;

/// Default tree name.
pub const DEFAULT_TREE_NAME: &str = "events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Idle,
    Streaming,
    Done,
    EarlyStopped,
}

/// Streams datasets through their regions and aggregators.
#[derive(Debug, Clone)]
pub struct HistMaker {
    /// Entries per chunk.
    pub step_size: usize,
    /// Tree read when a dataset names none.
    pub tree_name: String,
    /// Weight used when neither dataset nor region has one.
    pub default_weight: Option<String>,
    /// Multiply `default_weight` in even when other weights apply.
    pub enforce_default_weight: bool,
    /// Extra columns always read.
    pub branch_list: BTreeSet<String>,
    /// Column renames, `new name -> name on disk`.
    pub branch_rename: BTreeMap<String, String>,
    /// Early-termination threshold.
    pub termination_threshold: u64,
}

impl Default for HistMaker {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            tree_name: DEFAULT_TREE_NAME.to_string(),
            default_weight: None,
            enforce_default_weight: false,
            branch_list: BTreeSet::new(),
            branch_rename: BTreeMap::new(),
            termination_threshold: DEFAULT_TERMINATION_THRESHOLD,
        }
    }
}

impl HistMaker {
    /// Maker with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size.
    pub fn with_step_size(mut self, step_size: usize) -> Self {
        self.step_size = step_size;
        self
    }

    /// Set the default tree name.
    pub fn with_tree_name(mut self, tree_name: impl Into<String>) -> Self {
        self.tree_name = tree_name.into();
        self
    }

    /// Set the default weight and whether it is always applied.
    pub fn with_default_weight(mut self, weight: impl Into<String>, enforce: bool) -> Self {
        self.default_weight = Some(weight.into());
        self.enforce_default_weight = enforce;
        self
    }

    /// Always read `branch`.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch_list.insert(branch.into());
        self
    }

    /// Expose on-disk column `old` as `new`.
    pub fn with_rename(mut self, new: impl Into<String>, old: impl Into<String>) -> Self {
        self.branch_rename.insert(new.into(), old.into());
        self
    }

    /// Set the early-termination threshold.
    pub fn with_termination_threshold(mut self, threshold: u64) -> Self {
        self.termination_threshold = threshold;
        self
    }

    /// Early-termination counter starting at this maker's threshold.
    pub fn termination(&self) -> EarlyTermination {
        EarlyTermination::starting_at(self.termination_threshold)
    }

    /// Columns to read for `dataset`, under their on-disk names.
    pub fn branch_filter(&self, dataset: &Dataset) -> Result<BTreeSet<String>> {
        let mut wanted = dataset.branch_union();
        wanted.extend(self.branch_list.iter().cloned());
        if let Some(w) = self.default_weight.as_deref().filter(|w| !w.trim().is_empty()) {
            wanted.extend(required_branches(&[w])?);
        }
        Ok(wanted
            .into_iter()
            .map(|name| self.branch_rename.get(&name).cloned().unwrap_or(name))
            .collect())
    }

    fn rename_columns(&self, chunk: &mut Chunk) {
        for (new, old) in &self.branch_rename {
            chunk.rename(old, new);
        }
    }

    /// Stream one tree through `dataset`.
    ///
    /// Returns without reading when the tree is absent or empty, or when
    /// `termination` is already above the threshold. Otherwise chunks are
    /// processed until the tree is exhausted or `termination` exceeds the
    /// threshold after a chunk. Either way the aggregators keep what they
    /// accumulated.
    pub fn process(
        &self,
        dataset: &mut Dataset,
        tree: Option<&dyn EventTree>,
        evaluator: &mut dyn Evaluate,
        termination: &mut EarlyTermination,
    ) -> Result<()> {
        let Some(tree) = tree else {
            tracing::info!(dataset = %dataset.name, "no tree, nothing to process");
            return Ok(());
        };
        if tree.num_entries() == 0 {
            tracing::info!(dataset = %dataset.name, tree = tree.name(), "tree has no entries");
            return Ok(());
        }
        if termination.exceeds(self.termination_threshold) {
            tracing::info!(
                dataset = %dataset.name,
                counter = termination.count(),
                "early-termination counter already exceeded, skipping"
            );
            return Ok(());
        }

        let filter = self.branch_filter(dataset)?;
        tracing::info!(
            dataset = %dataset.name,
            tree = tree.name(),
            entries = tree.num_entries(),
            branches = filter.len(),
            "processing"
        );

        let mut state = StreamState::Idle;
        let mut events = 0u64;
        for chunk in tree.iterate(self.step_size, &filter)? {
            let mut chunk = chunk?;
            state = StreamState::Streaming;
            self.rename_columns(&mut chunk);
            events += chunk.report().n_events();
            self.process_chunk(dataset, &chunk, evaluator, termination)?;
            if termination.exceeds(self.termination_threshold) {
                state = StreamState::EarlyStopped;
                break;
            }
        }
        if state != StreamState::EarlyStopped {
            state = StreamState::Done;
        }
        tracing::info!(
            dataset = %dataset.name,
            events,
            counter = termination.count(),
            ?state,
            "finished"
        );
        Ok(())
    }

    fn process_chunk(
        &self,
        dataset: &mut Dataset,
        chunk: &Chunk,
        evaluator: &mut dyn Evaluate,
        termination: &mut EarlyTermination,
    ) -> Result<()> {
        let entries = chunk.report();
        let selection = dataset.selection.as_deref().filter(|s| !s.trim().is_empty());
        let dataset_mask = match selection {
            Some(sel) => {
                let mask = evaluate_mask(chunk, sel, evaluator)?;
                if mask.count_true() == 0 {
                    tracing::debug!(
                        start = entries.tree_entry_start,
                        stop = entries.tree_entry_stop,
                        "no event after dataset selection"
                    );
                    return Ok(());
                }
                Some(mask)
            }
            None => None,
        };

        for region in dataset.regions.iter_mut() {
            if region.selection.as_deref().is_none_or(|s| s.trim().is_empty()) {
                tracing::debug!(
                    region = %region.name,
                    "empty region selection, using dataset selection"
                );
            }
            let mask = compose_mask(
                chunk,
                selection,
                region.selection.as_deref(),
                dataset_mask.as_ref(),
                evaluator,
            )?;
            let weight = compose_weight(
                chunk,
                dataset.weight.as_ref(),
                region.weight.as_ref(),
                self.default_weight.as_deref(),
                self.enforce_default_weight,
                evaluator,
            )?;
            let outcome = dispatch(
                chunk,
                mask.as_deref(),
                weight.as_ref(),
                &mut region.aggregators,
                evaluator,
                termination,
            )?;
            if outcome == Dispatch::RegionSkipped {
                tracing::debug!(
                    region = %region.name,
                    start = entries.tree_entry_start,
                    "region skipped for this chunk"
                );
            }
        }
        Ok(())
    }

    /// Look up the dataset's tree in `file` and stream it.
    pub fn process_file(
        &self,
        dataset: &mut Dataset,
        file: &dyn NtupleFile,
        evaluator: &mut dyn Evaluate,
        termination: &mut EarlyTermination,
    ) -> Result<()> {
        let name = dataset.tree_name.clone().unwrap_or_else(|| self.tree_name.clone());
        let tree = file.get_tree(&name)?;
        self.process(dataset, tree.as_deref(), evaluator, termination)
    }

    /// Stream every Parquet file of every dataset, in order.
    ///
    /// `termination` is shared by all datasets.
    pub fn run(&self, datasets: &mut [Dataset], termination: &mut EarlyTermination) -> Result<()> {
        if self.step_size == 0 {
            return Err(Error::Validation("step_size must be positive".into()));
        }
        let mut evaluator = ExprCache::new();
        for dataset in datasets.iter_mut() {
            let files = dataset.files.clone();
            for path in &files {
                let file = ParquetFile::open(path)?;
                self.process_file(dataset, &file, &mut evaluator, termination)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Histogram;
    use crate::dataset::Region;
    use ssrl_ntuple::{Column, MemoryTree};

    fn energy_hist() -> Histogram {
        Histogram::uniform("h", "energy", 2, 0.0, 1.0).unwrap()
    }

    #[test]
    fn branch_filter_unions_and_renames() {
        let mut ds = Dataset::new("d").with_selection("trig > 0").with_region(
            Region::new("r").with_aggregator(energy_hist()),
        );
        ds.collect_branches().unwrap();
        let maker = HistMaker::new()
            .with_default_weight("lumi", false)
            .with_branch("run")
            .with_rename("energy", "E_raw");
        let filter = maker.branch_filter(&ds).unwrap();
        let expect: BTreeSet<String> =
            ["E_raw", "lumi", "run", "trig"].iter().map(|s| s.to_string()).collect();
        assert_eq!(filter, expect);
    }

    #[test]
    fn renamed_columns_reach_expressions() {
        let tree = MemoryTree::new("events")
            .with_column("E_raw", Column::Flat(vec![0.25, 0.75, 0.75]))
            .unwrap();
        let mut ds = Dataset::new("d").with_region(
            Region::new("r").with_aggregator(energy_hist()),
        );
        ds.collect_branches().unwrap();
        let maker = HistMaker::new().with_step_size(2).with_rename("energy", "E_raw");
        let mut ev = ExprCache::new();
        let mut term = EarlyTermination::new();
        maker.process(&mut ds, Some(&tree), &mut ev, &mut term).unwrap();
        let crate::aggregator::Aggregator::Histogram(h) = &ds.regions[0].aggregators[0] else {
            panic!("not a histogram")
        };
        assert_eq!(h.content, vec![1.0, 2.0]);
    }

    #[test]
    fn missing_tree_is_nothing_to_do() {
        let mut ds = Dataset::new("d");
        let mut ev = ExprCache::new();
        let mut term = EarlyTermination::new();
        HistMaker::new().process(&mut ds, None, &mut ev, &mut term).unwrap();
        assert_eq!(term.increments(), 0);
    }

    #[test]
    fn termination_starts_at_configured_threshold() {
        let maker = HistMaker::new().with_termination_threshold(5);
        let term = maker.termination();
        assert_eq!(term.count(), 5);
        assert!(!term.exceeds(maker.termination_threshold));
    }

    #[test]
    fn run_rejects_zero_step_size() {
        let maker = HistMaker::new().with_step_size(0);
        let mut term = EarlyTermination::new();
        assert!(matches!(maker.run(&mut [], &mut term), Err(Error::Validation(_))));
    }
}
