//! `shard`: keep every `num_shards`-th record, starting at `shard_idx`.

use crate::data::Data;
use crate::error::{Error, Result};
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;

pub struct ShardedDataSource {
    inner: BoxedSource,
    shard_idx: usize,
    num_shards: usize,
    // Zero-based index of the next upstream record.
    index: usize,
}

impl ShardedDataSource {
    pub(crate) fn new(inner: BoxedSource, shard_idx: usize, num_shards: usize) -> Result<Self> {
        if num_shards == 0 {
            return Err(Error::invalid_argument("`num_shards` must be greater than zero."));
        }
        if shard_idx >= num_shards {
            return Err(Error::invalid_argument(format!(
                "`shard_idx` must be less than `num_shards` ({num_shards}), but is {shard_idx}."
            )));
        }

        Ok(Self {
            inner,
            shard_idx,
            num_shards,
            index: 0,
        })
    }
}

impl DataSource for ShardedDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        while let Some(data) = self.inner.next()? {
            let index = self.index;
            self.index += 1;
            if index % self.num_shards == self.shard_idx {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<()> {
        self.index = 0;
        self.inner.reset()
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)?;
        tape.record(&self.index);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.reload_position(tape)?;
        self.index = tape.read()?;
        Ok(())
    }
}
