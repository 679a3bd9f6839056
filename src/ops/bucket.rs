//! `bucket`: group consecutive records into fixed-size batches.

use crate::data::Data;
use crate::error::{Error, Result};
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;

pub struct BucketDataSource {
    inner: BoxedSource,
    bucket_size: usize,
    drop_remainder: bool,
}

impl BucketDataSource {
    pub(crate) fn new(inner: BoxedSource, bucket_size: usize, drop_remainder: bool) -> Result<Self> {
        if bucket_size == 0 {
            return Err(Error::invalid_argument("`bucket_size` must be greater than zero."));
        }

        Ok(Self {
            inner,
            bucket_size,
            drop_remainder,
        })
    }
}

impl DataSource for BucketDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        let mut bucket = Vec::with_capacity(self.bucket_size);
        while bucket.len() < self.bucket_size {
            match self.inner.next()? {
                Some(data) => bucket.push(data),
                None => break,
            }
        }

        if bucket.is_empty() || (self.drop_remainder && bucket.len() < self.bucket_size) {
            return Ok(None);
        }
        Ok(Some(Data::List(bucket)))
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    // A bucket is always filled within one `next`; nothing is pending between pulls.
    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.reload_position(tape)
    }
}
