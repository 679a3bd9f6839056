//! `filter`: keep only the records a predicate accepts.

use crate::data::Data;
use crate::error::{Error, Result};
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;
use std::sync::Arc;

/// A user predicate deciding whether a record is kept.
pub type PredicateFn = Arc<dyn Fn(&Data) -> anyhow::Result<bool> + Send + Sync>;

pub struct FilteredDataSource {
    inner: BoxedSource,
    predicate: PredicateFn,
}

impl FilteredDataSource {
    pub(crate) fn new(inner: BoxedSource, predicate: PredicateFn) -> Self {
        Self { inner, predicate }
    }
}

impl DataSource for FilteredDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        while let Some(data) = self.inner.next()? {
            let keep = (self.predicate)(&data)
                .map_err(|e| Error::from_user("The filter predicate has failed.", e))?;
            if keep {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> Result<()> {
        self.inner.reset()
    }

    // Rejected records are consumed within a single `next`, so upstream is
    // always positioned right after the last emitted record.
    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.reload_position(tape)
    }
}
