//! Tree/reader interface and an in-memory implementation.
//!
//! A file exposes named trees; a tree streams its entries as [`Chunk`]s of at
//! most `step_size` events, restricted to the requested columns. Iteration is
//! lazy and restartable: every call to [`EventTree::iterate`] starts again at
//! entry 0.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::chunk::Chunk;
use crate::column::Column;
use crate::error::{NtupleError, Result};

/// Lazy sequence of chunks.
pub type ChunkIter<'a> = Box<dyn Iterator<Item = Result<Chunk>> + 'a>;

/// A tree of events with named columns.
pub trait EventTree {
    /// Tree name.
    fn name(&self) -> &str;

    /// Total number of entries.
    fn num_entries(&self) -> u64;

    /// Stream the tree in chunks of at most `step_size` entries.
    ///
    /// Only columns named in `filter_name` are materialized; an empty filter
    /// selects every column. Names absent from the tree are ignored.
    fn iterate(&self, step_size: usize, filter_name: &BTreeSet<String>) -> Result<ChunkIter<'_>>;
}

/// An opened ntuple file.
pub trait NtupleFile {
    /// Look up a tree by name; `Ok(None)` if the file has no such tree.
    fn get_tree(&self, name: &str) -> Result<Option<Box<dyn EventTree + '_>>>;
}

impl<T: EventTree + ?Sized> EventTree for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn num_entries(&self) -> u64 {
        (**self).num_entries()
    }

    fn iterate(&self, step_size: usize, filter_name: &BTreeSet<String>) -> Result<ChunkIter<'_>> {
        (**self).iterate(step_size, filter_name)
    }
}

pub(crate) fn check_step_size(step_size: usize) -> Result<()> {
    if step_size == 0 {
        return Err(NtupleError::InvalidArgument("step_size must be positive".into()));
    }
    Ok(())
}

/// Whether `name` passes a column filter (empty filter keeps everything).
pub fn filter_accepts(filter_name: &BTreeSet<String>, name: &str) -> bool {
    filter_name.is_empty() || filter_name.contains(name)
}

// ── In-memory implementation ───────────────────────────────────

/// Tree whose columns live in memory.
#[derive(Debug, Clone)]
pub struct MemoryTree {
    name: String,
    entries: usize,
    columns: BTreeMap<String, Column>,
}

impl MemoryTree {
    /// Create an empty tree.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), entries: 0, columns: BTreeMap::new() }
    }

    /// Add a column. The first column fixes the number of entries.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if self.columns.is_empty() {
            self.entries = column.n_events();
        } else if column.n_events() != self.entries {
            return Err(NtupleError::Shape(format!(
                "column '{name}' has {} entries, tree '{}' has {}",
                column.n_events(),
                self.name,
                self.entries
            )));
        }
        self.columns.insert(name, column);
        Ok(self)
    }
}

impl EventTree for MemoryTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_entries(&self) -> u64 {
        self.entries as u64
    }

    fn iterate(&self, step_size: usize, filter_name: &BTreeSet<String>) -> Result<ChunkIter<'_>> {
        check_step_size(step_size)?;
        let filter = filter_name.clone();
        let iter = (0..self.entries).step_by(step_size).map(move |start| {
            let stop = (start + step_size).min(self.entries);
            let columns: HashMap<String, Column> = self
                .columns
                .iter()
                .filter(|(name, _)| filter_accepts(&filter, name))
                .map(|(name, col)| (name.clone(), col.slice(start, stop)))
                .collect();
            Chunk::new(start as u64, stop - start, columns)
        });
        Ok(Box::new(iter))
    }
}

/// Collection of in-memory trees.
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    trees: HashMap<String, MemoryTree>,
}

impl MemoryFile {
    /// Create an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tree, replacing any tree of the same name.
    pub fn with_tree(mut self, tree: MemoryTree) -> Self {
        self.trees.insert(tree.name.clone(), tree);
        self
    }
}

impl NtupleFile for MemoryFile {
    fn get_tree(&self, name: &str) -> Result<Option<Box<dyn EventTree + '_>>> {
        Ok(self.trees.get(name).map(|t| Box::new(t) as Box<dyn EventTree + '_>))
    }
}
