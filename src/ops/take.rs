//! `take`: pass through the first `num_examples` records, then end.

use crate::data::Data;
use crate::error::Result;
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;

pub struct TakeDataSource {
    inner: BoxedSource,
    num_examples: usize,
    taken: usize,
}

impl TakeDataSource {
    pub(crate) fn new(inner: BoxedSource, num_examples: usize) -> Self {
        Self {
            inner,
            num_examples,
            taken: 0,
        }
    }
}

impl DataSource for TakeDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        if self.taken >= self.num_examples {
            return Ok(None);
        }

        let data = self.inner.next()?;
        if data.is_some() {
            self.taken += 1;
        }
        Ok(data)
    }

    fn reset(&mut self) -> Result<()> {
        self.taken = 0;
        self.inner.reset()
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)?;
        tape.record(&self.taken);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.reload_position(tape)?;
        self.taken = tape.read()?;
        Ok(())
    }
}
