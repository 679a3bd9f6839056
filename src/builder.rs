//! Chainable construction of a [`DataPipeline`].

use crate::data::Data;
use crate::error::Result;
use crate::ops::bucket::BucketDataSource;
use crate::ops::bucket_by_length::{BucketByLengthDataSource, LengthExtractor};
use crate::ops::filter::FilteredDataSource;
use crate::ops::map::{ElementMapper, MappedDataSource};
use crate::ops::prefetch::PrefetchedDataSource;
use crate::ops::shard::ShardedDataSource;
use crate::ops::shuffle::ShuffledDataSource;
use crate::ops::skip::SkipDataSource;
use crate::ops::take::TakeDataSource;
use crate::ops::yield_from::YieldFromDataSource;
use crate::pipeline::DataPipeline;
use crate::rng::SplitMix64;
use crate::source::BoxedSource;
use crate::tracker::PipelineTracker;
use std::sync::Arc;

/// Builds a [`DataPipeline`] one operator at a time.
///
/// Every method consumes the builder and wraps the current root in a new
/// operator. Invalid arguments do not interrupt the chain: the first failure
/// is kept and returned by [`DataPipelineBuilder::and_return`].
///
/// ```
/// use datapipe::{read_sequence, Data};
///
/// let mut pipeline = read_sequence((1..=5).map(Data::from).collect())
///     .filter(|d| Ok(d.as_int().unwrap_or(0) % 2 == 1))
///     .bucket(2, false)
///     .and_return()
///     .unwrap();
///
/// assert_eq!(
///     pipeline.next().unwrap(),
///     Some(Data::List(vec![Data::Int(1), Data::Int(3)]))
/// );
/// ```
#[must_use = "a builder does nothing until `and_return` is called"]
pub struct DataPipelineBuilder {
    source: Result<BoxedSource>,
}

impl DataPipelineBuilder {
    /// Start a builder from a custom root source.
    pub fn from_source(source: BoxedSource) -> Self {
        Self { source: Ok(source) }
    }

    pub(crate) fn from_result(source: Result<BoxedSource>) -> Self {
        Self { source }
    }

    fn wrap<F>(self, f: F) -> Self
    where
        F: FnOnce(BoxedSource) -> Result<BoxedSource>,
    {
        Self {
            source: self.source.and_then(f),
        }
    }

    /// Transform every record with `mapper`.
    ///
    /// With `num_parallel_calls > 1` records are pulled in batches of that
    /// size and mapped on a dedicated pool of `min(num_parallel_calls, num_cpus)`
    /// threads; output order always matches input order.
    pub fn map(self, mapper: ElementMapper, num_parallel_calls: usize, warn_only: bool) -> Self {
        self.wrap(|inner| {
            let op = MappedDataSource::new(inner, mapper, num_parallel_calls, warn_only)?;
            Ok(Box::new(op))
        })
    }

    /// Shorthand for a sequential, non-tolerant [`DataPipelineBuilder::map`].
    pub fn map_fn<F>(self, f: F) -> Self
    where
        F: Fn(Data) -> anyhow::Result<Data> + Send + Sync + 'static,
    {
        self.map(ElementMapper::new(f), 1, false)
    }

    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Data) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.wrap(|inner| Ok(Box::new(FilteredDataSource::new(inner, Arc::new(predicate)))))
    }

    /// Group consecutive records into lists of `bucket_size`.
    pub fn bucket(self, bucket_size: usize, drop_remainder: bool) -> Self {
        self.wrap(|inner| Ok(Box::new(BucketDataSource::new(inner, bucket_size, drop_remainder)?)))
    }

    /// Group records into per-length buckets described by `(max_length, batch_size)` pairs.
    pub fn bucket_by_length(
        self,
        bucket_sizes: Vec<(usize, usize)>,
        extractor: LengthExtractor,
        drop_remainder: bool,
        warn_only: bool,
    ) -> Self {
        self.wrap(|inner| {
            let op = BucketByLengthDataSource::new(
                inner,
                bucket_sizes,
                extractor,
                drop_remainder,
                warn_only,
            )?;
            Ok(Box::new(op))
        })
    }

    /// Shuffle within a window of `shuffle_window` records (`0` buffers everything).
    ///
    /// The seed is drawn from process entropy; use
    /// [`DataPipelineBuilder::shuffle_with_seed`] for reproducible order.
    pub fn shuffle(self, shuffle_window: usize, strict: bool, enabled: bool) -> Self {
        let seed = SplitMix64::from_entropy().next_u64();
        self.shuffle_with_seed(shuffle_window, seed, strict, enabled)
    }

    pub fn shuffle_with_seed(
        self,
        shuffle_window: usize,
        seed: u64,
        strict: bool,
        enabled: bool,
    ) -> Self {
        self.wrap(|inner| {
            Ok(Box::new(ShuffledDataSource::new(
                inner,
                shuffle_window,
                seed,
                strict,
                enabled,
            )))
        })
    }

    /// Keep every record whose index modulo `num_shards` equals `shard_idx`.
    pub fn shard(self, shard_idx: usize, num_shards: usize) -> Self {
        self.wrap(|inner| Ok(Box::new(ShardedDataSource::new(inner, shard_idx, num_shards)?)))
    }

    pub fn skip(self, num_examples: usize) -> Self {
        self.wrap(|inner| Ok(Box::new(SkipDataSource::new(inner, num_examples))))
    }

    pub fn take(self, num_examples: usize) -> Self {
        self.wrap(|inner| Ok(Box::new(TakeDataSource::new(inner, num_examples))))
    }

    /// Replace each record with every record of the pipeline `f` builds from it.
    pub fn yield_from<F>(self, f: F) -> Self
    where
        F: Fn(&Data) -> anyhow::Result<DataPipeline> + Send + Sync + 'static,
    {
        self.wrap(|inner| Ok(Box::new(YieldFromDataSource::new(inner, Arc::new(f)))))
    }

    /// Read up to `num_examples` records ahead on a background thread.
    ///
    /// `0` disables read-ahead.
    pub fn prefetch(self, num_examples: usize) -> Self {
        self.wrap(|inner| Ok(Box::new(PrefetchedDataSource::new(inner, num_examples))))
    }

    /// Finish the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first argument error raised while the chain was built.
    pub fn and_return(self) -> Result<DataPipeline> {
        self.source.map(DataPipeline::from_source)
    }

    /// Finish the pipeline and register it with `tracker`.
    ///
    /// # Errors
    ///
    /// See [`DataPipelineBuilder::and_return`].
    pub fn and_return_tracked(self, tracker: &PipelineTracker) -> Result<DataPipeline> {
        let mut pipeline = self.and_return()?;
        tracker.track(&mut pipeline);
        Ok(pipeline)
    }
}
