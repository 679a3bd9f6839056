//! `shuffle`: randomize record order within a bounded window.
//!
//! The operator first buffers `shuffle_window` records (or the whole stream
//! when the window is zero). Each pull then emits a uniformly chosen buffered
//! record and backfills its slot with the next upstream record. Once upstream
//! ends, the buffer drains in random order.
//!
//! In strict mode the generator state and the buffer are part of the tape,
//! so a resumed pipeline replays exactly the same order. Otherwise only the
//! upstream position is kept and shuffling restarts from an empty buffer.

use crate::data::Data;
use crate::error::Result;
use crate::rng::SplitMix64;
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;

pub struct ShuffledDataSource {
    inner: BoxedSource,
    shuffle_window: usize,
    strict: bool,
    enabled: bool,
    seed: u64,
    rng: SplitMix64,
    buffer: Vec<Data>,
    filled: bool,
    upstream_done: bool,
}

impl ShuffledDataSource {
    pub(crate) fn new(
        inner: BoxedSource,
        shuffle_window: usize,
        seed: u64,
        strict: bool,
        enabled: bool,
    ) -> Self {
        Self {
            inner,
            shuffle_window,
            strict,
            enabled,
            seed,
            rng: SplitMix64::new(seed),
            buffer: Vec::new(),
            filled: false,
            upstream_done: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        while self.shuffle_window == 0 || self.buffer.len() < self.shuffle_window {
            match self.inner.next()? {
                Some(data) => self.buffer.push(data),
                None => {
                    self.upstream_done = true;
                    break;
                }
            }
        }
        self.filled = true;
        Ok(())
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.filled = false;
        self.upstream_done = false;
    }
}

impl DataSource for ShuffledDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        if !self.enabled {
            return self.inner.next();
        }

        if !self.filled {
            self.fill()?;
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }

        let idx = self.rng.below(self.buffer.len());

        if !self.upstream_done {
            match self.inner.next()? {
                Some(data) => return Ok(Some(std::mem::replace(&mut self.buffer[idx], data))),
                None => self.upstream_done = true,
            }
        }

        Ok(Some(self.buffer.swap_remove(idx)))
    }

    fn reset(&mut self) -> Result<()> {
        self.clear();
        self.rng = SplitMix64::new(self.seed);
        self.inner.reset()
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)?;

        if self.enabled && self.strict {
            tape.record(&self.rng.state());
            tape.record(&self.buffer);
            tape.record(&self.filled);
            tape.record(&self.upstream_done);
        }
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.clear();
        self.inner.reload_position(tape)?;

        if self.enabled && self.strict {
            self.rng = SplitMix64::new(tape.read()?);
            self.buffer = tape.read()?;
            self.filled = tape.read()?;
            self.upstream_done = tape.read()?;
        }
        Ok(())
    }
}
