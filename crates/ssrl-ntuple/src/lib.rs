//! # ssrl-ntuple
//!
//! Columnar event data for the SSRL histogram maker.
//!
//! Provides the flat/ragged array model, chunks of events, a vectorized
//! expression evaluator, and the tree/reader interface with in-memory and
//! Parquet implementations.
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use ssrl_ntuple::{EventTree, Evaluate, ExprCache, NtupleFile, ParquetFile};
//!
//! let f = ParquetFile::open("run42.parquet").unwrap();
//! let tree = f.get_tree("events").unwrap().unwrap();
//! let mut exprs = ExprCache::new();
//! for chunk in tree.iterate(100_000, &BTreeSet::new()).unwrap() {
//!     let chunk = chunk.unwrap();
//!     let sel = exprs.evaluate("amp[0] > 10", &chunk).unwrap();
//!     let pass = sel.to_mask(chunk.n_events()).count_true();
//!     println!("{} events, {pass} pass", chunk.n_events());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod column;
pub mod error;
pub mod expr;
pub mod parquet;
pub mod source;

pub use chunk::{Chunk, ChunkReport};
pub use column::{Array, Column, Jagged, Mask, any_nonzero};
pub use error::{NtupleError, Result};
pub use expr::{CompiledExpr, Evaluate, ExprCache, Value};
pub use parquet::{ParquetFile, ParquetTree, TREE_NAME_KEY};
pub use source::{ChunkIter, EventTree, MemoryFile, MemoryTree, NtupleFile, filter_accepts};
