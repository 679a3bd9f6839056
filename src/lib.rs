//! # datapipe
//!
//! A **lazily-evaluated, pull-based data pipeline engine** for feeding training
//! loops. Pipelines read records from leaf sources, transform, batch, shuffle
//! and shard them on demand, and can save and restore their exact position so
//! an interrupted job resumes where it stopped.
//!
//! ## Key Features
//!
//! - **Pull-driven** - nothing runs ahead of the consumer except through an explicit bounded buffer
//! - **Checkpointable** - every operator records its position on a [`Tape`]
//! - **Parallel transforms** - ordered parallel `map` on a Rayon pool
//! - **Background read-ahead** - `prefetch` decouples producer and consumer rates
//! - **Deterministic shuffling** - seeded, windowed, and exactly resumable in strict mode
//! - **Composable** - `zip`, `round_robin` and `yield_from` combine whole pipelines
//!
//! ## Quick Start
//!
//! ```
//! use datapipe::{read_sequence, Data, ElementMapper};
//! # use datapipe::Result;
//!
//! # fn main() -> Result<()> {
//! let mut pipeline = read_sequence((0..10).map(Data::from).collect())
//!     .map(ElementMapper::new(|d| Ok(Data::Int(d.as_int().unwrap_or(0) * 10))), 4, false)
//!     .shuffle_with_seed(4, 1234, true, true)
//!     .bucket(3, false)
//!     .prefetch(2)
//!     .and_return()?;
//!
//! let first = pipeline.next()?;
//! let checkpoint = pipeline.state_dict()?;
//!
//! // ... the process restarts and rebuilds the same pipeline ...
//! # let mut resumed = read_sequence((0..10).map(Data::from).collect())
//! #     .map(ElementMapper::new(|d| Ok(Data::Int(d.as_int().unwrap_or(0) * 10))), 4, false)
//! #     .shuffle_with_seed(4, 1234, true, true)
//! #     .bucket(3, false)
//! #     .prefetch(2)
//! #     .and_return()?;
//! resumed.load_state_dict(&checkpoint, true)?;
//! assert_eq!(resumed.next()?, pipeline.next()?);
//! # let _ = first;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Data sources
//!
//! Leaf sources and operators implement the same four-operation
//! [`DataSource`] capability: `next`, `reset`, `record_position` and
//! `reload_position`. An operator exclusively owns the source it wraps.
//!
//! ### Pipelines
//!
//! A [`DataPipeline`] owns the root source and a tri-state
//! [`PipelineStatus`]. Once an error escapes, the pipeline is *broken*: every
//! pull fails with [`Error::Broken`] until [`DataPipeline::reset`] is called.
//!
//! ### Errors
//!
//! Errors are classified by [`ErrorKind`]. Record-level errors may be skipped
//! by operators built with `warn_only`; stream and pipeline errors always escalate.
//!
//! ### Shutdown
//!
//! Background threads live as long as their pipeline. A
//! [`PipelineTracker`] created at the composition root resets every tracked
//! pipeline on [`PipelineTracker::shutdown`].
//!
//! ## Feature Flags
//!
//! - `checkpointing` - Durable checkpoint files via [`checkpoint::CheckpointManager`]
//! - `compression-gzip` - [`read_zipped_records`] for gzip-compressed JSONL archives
//!
//! ## Module Overview
//!
//! - [`data`] - The [`Data`] record value and field selectors
//! - [`ops`] - One module per operator
//! - [`pipeline`] - Pipeline lifecycle and state dicts
//! - [`builder`] - Chainable pipeline construction
//! - [`io`] - Leaf sources
//! - [`tracker`] - Shutdown registry
//! - [`testing`] - Helpers for testing pipelines

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod builder;
pub mod data;
pub mod error;
pub mod io;
pub mod ops;
pub mod pipeline;
pub mod rng;
pub mod source;
pub mod tape;
pub mod testing;
pub mod tracker;

#[cfg_attr(docsrs, doc(cfg(feature = "checkpointing")))]
#[cfg(feature = "checkpointing")]
pub mod checkpoint;

pub use builder::DataPipelineBuilder;
pub use data::{Data, DataSelector};
pub use error::{Error, ErrorKind, Result};
pub use io::{list_files, read_sequence};
pub use ops::{ElementMapper, LengthExtractor, MapFn, PredicateFn, YieldFn, ZipOptions};
pub use pipeline::{DataPipeline, DataPipelineIter, PipelineStatus, StateDict, POSITION_KEY};
pub use rng::SplitMix64;
pub use source::{BoxedSource, DataSource};
pub use tape::{Tape, TapeValue};
pub use tracker::PipelineTracker;

#[cfg(feature = "compression-gzip")]
pub use io::read_zipped_records;
