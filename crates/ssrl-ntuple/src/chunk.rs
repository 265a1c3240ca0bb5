//! A batch of events materialized together.

use std::collections::HashMap;

use crate::column::Column;
use crate::error::{NtupleError, Result};

/// Entry range of a chunk within its tree, for progress accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReport {
    /// First tree entry in the chunk.
    pub tree_entry_start: u64,
    /// One past the last tree entry in the chunk.
    pub tree_entry_stop: u64,
}

impl ChunkReport {
    /// Number of events covered by the report.
    pub fn n_events(&self) -> u64 {
        self.tree_entry_stop - self.tree_entry_start
    }
}

/// Columns of one chunk, keyed by branch name.
///
/// Every column has the same outer length (the number of events in the chunk).
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    columns: HashMap<String, Column>,
    n_events: usize,
    entry_start: u64,
}

impl Chunk {
    /// Create a chunk covering `n_events` entries starting at `entry_start`.
    pub fn new(
        entry_start: u64,
        n_events: usize,
        columns: HashMap<String, Column>,
    ) -> Result<Self> {
        for (name, col) in &columns {
            if col.n_events() != n_events {
                return Err(NtupleError::Shape(format!(
                    "column '{name}' has {} events, chunk has {n_events}",
                    col.n_events()
                )));
            }
        }
        Ok(Self { columns, n_events, entry_start })
    }

    /// Create a chunk starting at entry 0; the event count is taken from the columns.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Column)>,
        S: Into<String>,
    {
        let columns: HashMap<String, Column> =
            columns.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let n_events = columns.values().next().map(|c| c.n_events()).unwrap_or(0);
        Self::new(0, n_events, columns)
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.n_events
    }

    /// Whether the chunk holds no events.
    pub fn is_empty(&self) -> bool {
        self.n_events == 0
    }

    /// Entry range of this chunk.
    pub fn report(&self) -> ChunkReport {
        ChunkReport {
            tree_entry_start: self.entry_start,
            tree_entry_stop: self.entry_start + self.n_events as u64,
        }
    }

    /// Look up a column.
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Look up a column, failing with [`NtupleError::MissingColumn`].
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns.get(name).ok_or_else(|| NtupleError::MissingColumn(name.to_string()))
    }

    /// Whether the chunk carries `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Names of all columns (unordered).
    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(String::as_str)
    }

    /// Rename a column; returns `false` if `from` is absent.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.columns.remove(from) {
            Some(col) => {
                self.columns.insert(to.to_string(), col);
                true
            }
            None => false,
        }
    }
}
