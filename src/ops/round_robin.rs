//! `round_robin`: interleave several pipelines, one record from each in turn.

use crate::data::Data;
use crate::error::{Error, Result};
use crate::pipeline::DataPipeline;
use crate::source::DataSource;
use crate::tape::Tape;

pub struct RoundRobinDataSource {
    pipelines: Vec<DataPipeline>,
    exhausted: Vec<bool>,
    idx: usize,
}

impl RoundRobinDataSource {
    pub(crate) fn new(pipelines: Vec<DataPipeline>) -> Self {
        let exhausted = vec![false; pipelines.len()];
        Self {
            pipelines,
            exhausted,
            idx: 0,
        }
    }
}

impl DataSource for RoundRobinDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        let count = self.pipelines.len();

        // Each pipeline is asked at most once per pull; an exhausted one
        // leaves the rotation for the rest of the pass.
        for _ in 0..count {
            let idx = self.idx;
            self.idx = (self.idx + 1) % count;

            if self.exhausted[idx] {
                continue;
            }
            match self.pipelines[idx].next()? {
                Some(data) => return Ok(Some(data)),
                None => self.exhausted[idx] = true,
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<()> {
        self.idx = 0;
        self.exhausted.fill(false);

        let mut first_err = None;
        for pipeline in &mut self.pipelines {
            if let Err(e) = pipeline.reset() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        for pipeline in &mut self.pipelines {
            pipeline.record_position(tape)?;
        }
        tape.record(&self.idx);
        tape.record(&self.exhausted);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        for pipeline in &mut self.pipelines {
            pipeline.reload_position(tape)?;
        }

        let idx: usize = tape.read()?;
        let exhausted: Vec<bool> = tape.read()?;
        if exhausted.len() != self.pipelines.len() || (idx > 0 && idx >= self.pipelines.len()) {
            return Err(Error::pipeline(format!(
                "The tape describes a round robin over {} pipelines, but the operator has {}.",
                exhausted.len(),
                self.pipelines.len()
            )));
        }

        self.idx = idx;
        self.exhausted = exhausted;
        Ok(())
    }
}
