//! The operators a [`DataPipelineBuilder`](crate::DataPipelineBuilder) can append.
//!
//! Every operator is a [`DataSource`](crate::DataSource) that exclusively owns
//! the source (or pipelines) it wraps.

pub mod bucket;
pub mod bucket_by_length;
pub mod filter;
pub mod map;
pub mod prefetch;
pub mod round_robin;
pub mod shard;
pub mod shuffle;
pub mod skip;
pub mod take;
pub mod yield_from;
pub mod zip;

pub use bucket_by_length::LengthExtractor;
pub use filter::PredicateFn;
pub use map::{ElementMapper, MapFn};
pub use yield_from::YieldFn;
pub use zip::ZipOptions;
