//! `bucket_by_length`: batch records of similar length together.
//!
//! Each `(max_length, batch_size)` threshold owns one bucket. A record goes
//! into the bucket of the smallest threshold that can hold it, and a bucket is
//! emitted as soon as it holds `batch_size` records. When upstream ends, the
//! partially filled buckets are flushed in ascending threshold order.

use crate::data::{Data, DataSelector};
use crate::error::{Error, Result};
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;
use std::sync::Arc;
use tracing::warn;

/// Computes the length used to route a record into a bucket.
#[derive(Clone)]
pub struct LengthExtractor {
    f: Arc<dyn Fn(&Data) -> anyhow::Result<usize> + Send + Sync>,
}

impl LengthExtractor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Data) -> anyhow::Result<usize> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Measure the record itself, or the field named by `selector`.
    ///
    /// Lists, dicts and strings measure their element count; non-negative
    /// integers measure as their value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `selector` cannot be parsed.
    pub fn from_selector(selector: Option<&str>) -> Result<Self> {
        let selector = selector.map(DataSelector::parse).transpose()?;

        Ok(Self::new(move |data| {
            let target = match &selector {
                Some(selector) => selector.find(data)?,
                None => data,
            };
            target.len_hint().ok_or_else(|| {
                anyhow::anyhow!("The length of a `{}` value cannot be determined.", target.type_name())
            })
        }))
    }

    /// Compute the length of `data`.
    ///
    /// # Errors
    ///
    /// Returns a record error if the extractor fails.
    pub fn length(&self, data: &Data) -> Result<usize> {
        (self.f)(data).map_err(|e| Error::from_user("The length extractor has failed.", e))
    }
}

pub struct BucketByLengthDataSource {
    inner: BoxedSource,
    bucket_sizes: Vec<(usize, usize)>,
    extractor: LengthExtractor,
    drop_remainder: bool,
    warn_only: bool,
    buckets: Vec<Vec<Data>>,
}

impl BucketByLengthDataSource {
    pub(crate) fn new(
        inner: BoxedSource,
        bucket_sizes: Vec<(usize, usize)>,
        extractor: LengthExtractor,
        drop_remainder: bool,
        warn_only: bool,
    ) -> Result<Self> {
        if bucket_sizes.is_empty() {
            return Err(Error::invalid_argument("`bucket_sizes` must not be empty."));
        }
        if bucket_sizes.iter().any(|&(_, batch_size)| batch_size == 0) {
            return Err(Error::invalid_argument(
                "The batch sizes in `bucket_sizes` must be greater than zero.",
            ));
        }
        if bucket_sizes.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(Error::invalid_argument(
                "The lengths in `bucket_sizes` must be in strictly increasing order.",
            ));
        }

        let buckets = bucket_sizes
            .iter()
            .map(|&(_, batch_size)| Vec::with_capacity(batch_size))
            .collect();

        Ok(Self {
            inner,
            bucket_sizes,
            extractor,
            drop_remainder,
            warn_only,
            buckets,
        })
    }

    fn max_length(&self) -> usize {
        self.bucket_sizes.last().map_or(0, |&(max_length, _)| max_length)
    }

    fn flush(&mut self) -> Option<Data> {
        if self.drop_remainder {
            self.buckets.iter_mut().for_each(Vec::clear);
            return None;
        }

        self.buckets
            .iter_mut()
            .find(|bucket| !bucket.is_empty())
            .map(|bucket| Data::List(std::mem::take(bucket)))
    }
}

impl DataSource for BucketByLengthDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        loop {
            let Some(data) = self.inner.next()? else {
                return Ok(self.flush());
            };

            let length = match self.extractor.length(&data) {
                Ok(length) => length,
                Err(e) if self.warn_only && e.is_recoverable() => {
                    warn!("Skipping a record whose length cannot be determined: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let Some(idx) = self
                .bucket_sizes
                .iter()
                .position(|&(max_length, _)| length <= max_length)
            else {
                let max_length = self.max_length();
                if self.warn_only {
                    warn!(
                        "Skipping a record of length {length} that exceeds the maximum bucket length {max_length}."
                    );
                    continue;
                }
                return Err(Error::record(format!(
                    "The length of a record ({length}) exceeds the maximum bucket length ({max_length})."
                )));
            };

            let batch_size = self.bucket_sizes[idx].1;
            let bucket = &mut self.buckets[idx];
            bucket.push(data);
            if bucket.len() >= batch_size {
                return Ok(Some(Data::List(std::mem::take(bucket))));
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.buckets.iter_mut().for_each(Vec::clear);
        self.inner.reset()
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)?;
        tape.record(&self.buckets);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.reload_position(tape)?;

        let buckets: Vec<Vec<Data>> = tape.read()?;
        if buckets.len() != self.bucket_sizes.len() {
            return Err(Error::pipeline(format!(
                "The tape holds {} buckets, but the operator has {}.",
                buckets.len(),
                self.bucket_sizes.len()
            )));
        }
        self.buckets = buckets;
        Ok(())
    }
}
