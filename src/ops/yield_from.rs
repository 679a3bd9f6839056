//! `yield_from`: expand each record into a nested pipeline and emit its records.
//!
//! The tape holds the upstream position, the outer record that produced the
//! active nested pipeline, and the nested pipeline's own tape. Reloading calls
//! the functor again on that outer record and fast-forwards the new nested
//! pipeline, so the functor must be deterministic for resumption to be exact.

use crate::data::Data;
use crate::error::{Error, Result};
use crate::pipeline::DataPipeline;
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;
use std::sync::Arc;

/// A user functor producing the nested pipeline for one outer record.
pub type YieldFn = Arc<dyn Fn(&Data) -> anyhow::Result<DataPipeline> + Send + Sync>;

pub struct YieldFromDataSource {
    inner: BoxedSource,
    yield_fn: YieldFn,
    current: Option<(Data, DataPipeline)>,
}

impl YieldFromDataSource {
    pub(crate) fn new(inner: BoxedSource, yield_fn: YieldFn) -> Self {
        Self {
            inner,
            yield_fn,
            current: None,
        }
    }

    fn expand(&self, outer: &Data) -> Result<DataPipeline> {
        (self.yield_fn)(outer)
            .map_err(|e| Error::from_user("The yield_from function has failed.", e))
    }
}

impl DataSource for YieldFromDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        loop {
            if let Some((_, nested)) = &mut self.current {
                if let Some(data) = nested.next()? {
                    return Ok(Some(data));
                }
                self.current = None;
            }

            let Some(outer) = self.inner.next()? else {
                return Ok(None);
            };
            let nested = self.expand(&outer)?;
            self.current = Some((outer, nested));
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.current = None;
        self.inner.reset()
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)?;

        match &mut self.current {
            Some((outer, nested)) => {
                let mut nested_tape = Tape::new();
                nested.record_position(&mut nested_tape)?;

                tape.record(&Some(outer.clone()));
                tape.record(&nested_tape.into_storage());
            }
            None => {
                tape.record(&None::<Data>);
                tape.record(&Vec::<Data>::new());
            }
        }
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.current = None;
        self.inner.reload_position(tape)?;

        let outer: Option<Data> = tape.read()?;
        let nested_storage: Vec<Data> = tape.read()?;

        if let Some(outer) = outer {
            let mut nested = self.expand(&outer)?;

            let mut nested_tape = Tape::from_storage(nested_storage);
            nested.reload_position(&mut nested_tape)?;
            if !nested_tape.is_eod() {
                return Err(Error::pipeline(
                    "The nested tape of the yield_from operator holds unread values.",
                ));
            }

            self.current = Some((outer, nested));
        }
        Ok(())
    }
}
