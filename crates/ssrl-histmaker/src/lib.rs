//! # ssrl-histmaker
//!
//! Streaming selection, weighting and histogramming of SSRL test-beam ntuples.
//!
//! Datasets are read chunk by chunk. For every chunk the dataset selection is
//! evaluated once, each region combines it with its own selection and weight,
//! and the region's aggregators (histograms, sample graphs, running-average
//! graphs) are filled from the selected events. A run-wide
//! [`EarlyTermination`] counter stops streaming once sample graphs saturate.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use ssrl_histmaker::read_config;
//!
//! let cfg = read_config(Path::new("histmaker.yaml")).unwrap();
//! let (maker, mut datasets) = cfg.build().unwrap();
//! let mut termination = maker.termination();
//! maker.run(&mut datasets, &mut termination).unwrap();
//! for ds in &datasets {
//!     for region in &ds.regions {
//!         for agg in &region.aggregators {
//!             println!("{}/{}/{}", ds.name, region.name, agg.name());
//!         }
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregator;
pub mod compose;
pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod error;
pub mod runinfo;
pub mod stream;
pub mod termination;

pub use aggregator::{
    Aggregator, AggregatorKind, AvgGraph, FillInput, FillWeight, FlowPolicy, Histogram,
    Histogram2D, Observable, SampleGraph,
};
pub use compose::{compose_mask, compose_selection, compose_weight};
pub use config::{HistMakerConfig, read_config};
pub use dataset::{Dataset, Region, WeightSpec, WeightTerm};
pub use dispatch::{Dispatch, dispatch};
pub use error::{Error, Result};
pub use runinfo::{FilenameParser, ResolvedRuns, RunInfo};
pub use stream::HistMaker;
pub use termination::{DEFAULT_TERMINATION_THRESHOLD, EarlyTermination};
