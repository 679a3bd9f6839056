//! `map`: apply a transform to every record, optionally on a worker pool.

use crate::data::{Data, DataSelector};
use crate::error::{Error, Result};
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// A user transform from one record to one record.
pub type MapFn = Arc<dyn Fn(Data) -> anyhow::Result<Data> + Send + Sync>;

/// A map function plus the sub-fields it applies to.
///
/// Without a selector the function sees the whole record. With one, each
/// selected sub-field is moved out, transformed, and written back in place.
#[derive(Clone)]
pub struct ElementMapper {
    f: MapFn,
    selector: Option<DataSelector>,
}

impl ElementMapper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Data) -> anyhow::Result<Data> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            selector: None,
        }
    }

    /// Restrict the function to the sub-fields named by `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `selector` cannot be parsed.
    pub fn with_selector(mut self, selector: &str) -> Result<Self> {
        self.selector = Some(DataSelector::parse(selector)?);
        Ok(self)
    }

    /// Compose several mappers into one, applied left to right.
    #[must_use]
    pub fn chain<I>(mappers: I) -> Self
    where
        I: IntoIterator<Item = ElementMapper>,
    {
        let mappers: Vec<ElementMapper> = mappers.into_iter().collect();
        Self {
            f: Arc::new(move |mut data: Data| -> anyhow::Result<Data> {
                for mapper in &mappers {
                    data = mapper.apply(data)?;
                }
                Ok(data)
            }),
            selector: None,
        }
    }

    /// Transform a single record.
    ///
    /// # Errors
    ///
    /// Returns a record error if the function fails or a selected field is missing.
    pub fn apply(&self, mut data: Data) -> Result<Data> {
        let Some(selector) = &self.selector else {
            return (self.f)(data)
                .map_err(|e| Error::from_user("The map function has failed.", e));
        };

        selector.visit_mut(&mut data, |slot| {
            let value = std::mem::replace(slot, Data::Bool(false));
            *slot = (self.f)(value).map_err(|e| {
                Error::from_user(
                    format!("The map function has failed on `{selector}`."),
                    e,
                )
            })?;
            Ok(())
        })?;
        Ok(data)
    }
}

pub struct MappedDataSource {
    inner: BoxedSource,
    mapper: ElementMapper,
    num_parallel_calls: usize,
    warn_only: bool,
    pool: Option<ThreadPool>,
    // Results computed ahead of the consumer, in pull order.
    buffer: VecDeque<Slot>,
}

enum Slot {
    /// Outcome of the map function; failures here may be skipped by `warn_only`.
    Mapped(Result<Data>),
    /// A failure raised upstream, which always reaches the consumer.
    Upstream(Error),
}

impl MappedDataSource {
    pub(crate) fn new(
        inner: BoxedSource,
        mapper: ElementMapper,
        num_parallel_calls: usize,
        warn_only: bool,
    ) -> Result<Self> {
        if num_parallel_calls == 0 {
            return Err(Error::invalid_argument(
                "`num_parallel_calls` must be greater than zero.",
            ));
        }

        let pool = if num_parallel_calls > 1 {
            let threads = num_parallel_calls.min(num_cpus::get().max(1));
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("datapipe-map-{i}"))
                .build()
                .map_err(|e| Error::Internal(format!("cannot start the map worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            inner,
            mapper,
            num_parallel_calls,
            warn_only,
            pool,
            buffer: VecDeque::new(),
        })
    }

    /// Pull up to `num_parallel_calls` records and map them concurrently.
    ///
    /// Returns `false` once upstream has nothing left.
    fn fill_buffer(&mut self, pool: &ThreadPool) -> bool {
        let mut batch = Vec::with_capacity(self.num_parallel_calls);
        let mut upstream_error = None;
        while batch.len() < self.num_parallel_calls {
            match self.inner.next() {
                Ok(Some(data)) => batch.push(data),
                Ok(None) => break,
                Err(e) => {
                    upstream_error = Some(e);
                    break;
                }
            }
        }

        if batch.is_empty() && upstream_error.is_none() {
            return false;
        }

        let mapper = &self.mapper;
        let mapped: Vec<Result<Data>> =
            pool.install(|| batch.into_par_iter().map(|d| mapper.apply(d)).collect());

        self.buffer.extend(mapped.into_iter().map(Slot::Mapped));
        if let Some(e) = upstream_error {
            self.buffer.push_back(Slot::Upstream(e));
        }
        true
    }

    fn tolerate(&self, err: &Error) -> bool {
        if self.warn_only && err.is_recoverable() {
            warn!("Skipping a record because the map function has failed: {err:#}");
            true
        } else {
            false
        }
    }
}

impl DataSource for MappedDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        loop {
            if let Some(slot) = self.buffer.pop_front() {
                match slot {
                    Slot::Mapped(Ok(data)) => return Ok(Some(data)),
                    Slot::Mapped(Err(e)) if self.tolerate(&e) => continue,
                    Slot::Mapped(Err(e)) | Slot::Upstream(e) => return Err(e),
                }
            }

            let Some(pool) = self.pool.take() else {
                let Some(data) = self.inner.next()? else {
                    return Ok(None);
                };
                match self.mapper.apply(data) {
                    Ok(data) => return Ok(Some(data)),
                    Err(e) if self.tolerate(&e) => continue,
                    Err(e) => return Err(e),
                }
            };

            let filled = self.fill_buffer(&pool);
            self.pool = Some(pool);
            if !filled {
                return Ok(None);
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.buffer.clear();
        self.inner.reset()
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.inner.record_position(tape)?;

        // Only the records ahead of the first failure the consumer would see
        // are reachable; that failure is kept so it surfaces at the same pull.
        let mut pending = Vec::with_capacity(self.buffer.len());
        let mut failure = None;
        for slot in &self.buffer {
            match slot {
                Slot::Mapped(Ok(data)) => pending.push(data.clone()),
                Slot::Mapped(Err(e)) if self.warn_only && e.is_recoverable() => {}
                Slot::Mapped(Err(e)) | Slot::Upstream(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        tape.record(&pending);
        tape.record_failure(failure);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.buffer.clear();
        self.inner.reload_position(tape)?;

        let pending: Vec<Data> = tape.read()?;
        let failure = tape.read_failure()?;
        self.buffer.extend(pending.into_iter().map(|data| Slot::Mapped(Ok(data))));
        self.buffer.extend(failure.map(Slot::Upstream));
        Ok(())
    }
}
