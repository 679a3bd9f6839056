//! `skip`: drop the first `num_examples` records.

use crate::data::Data;
use crate::error::Result;
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;

pub struct SkipDataSource {
    inner: BoxedSource,
    num_examples: usize,
    skipped: usize,
}

impl SkipDataSource {
    pub(crate) fn new(inner: BoxedSource, num_examples: usize) -> Self {
        Self {
            inner,
            num_examples,
            skipped: 0,
        }
    }
}

impl DataSource for SkipDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        while self.skipped < self.num_examples {
            if self.inner.next()?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }
        self.inner.next()
    }

    fn reset(&mut self) -> Result<()> {
        self.skipped = 0;
        self.inner.reset()
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)?;
        tape.record(&self.skipped);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.reload_position(tape)?;
        self.skipped = tape.read()?;
        Ok(())
    }
}
