use crate::builder::DataPipelineBuilder;
use crate::data::Data;
use crate::error::{Error, Result};
use crate::ops::round_robin::RoundRobinDataSource;
use crate::ops::zip::{ZipOptions, ZippedDataSource};
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;
use crate::tracker::Registration;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Key under which [`DataPipeline::state_dict`] stores the tape.
pub const POSITION_KEY: &str = "position";

/// A checkpoint document: the pipeline position under [`POSITION_KEY`], so
/// callers can merge it into a larger checkpoint.
pub type StateDict = BTreeMap<String, Data>;

/// Lifecycle state of a [`DataPipeline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStatus {
    /// The pipeline may still produce records.
    Active,
    /// The last pull returned nothing; only `reset` starts a new pass.
    Exhausted,
    /// An error escaped the pipeline; every pull fails until `reset`.
    Broken,
}

pub(crate) struct PipelineState {
    source: BoxedSource,
    status: PipelineStatus,
}

impl PipelineState {
    fn next(&mut self) -> Result<Option<Data>> {
        match self.status {
            PipelineStatus::Broken => return Err(Error::Broken),
            PipelineStatus::Exhausted => return Ok(None),
            PipelineStatus::Active => {}
        }

        match self.source.next() {
            Ok(Some(data)) => Ok(Some(data)),
            Ok(None) => {
                self.status = PipelineStatus::Exhausted;
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub(crate) fn reset(&mut self) -> Result<()> {
        self.status = PipelineStatus::Active;
        self.source.reset().map_err(|e| self.fail(e))
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        if self.status == PipelineStatus::Broken {
            return Err(Error::Broken);
        }
        self.source.record_position(tape).map_err(|e| self.fail(e))
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        self.status = PipelineStatus::Active;
        self.source.reload_position(tape).map_err(|e| self.fail(e))
    }

    fn fail(&mut self, err: Error) -> Error {
        self.status = PipelineStatus::Broken;
        err
    }

    pub(crate) const fn status(&self) -> PipelineStatus {
        self.status
    }
}

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A composed, pull-driven graph of data sources.
///
/// Pipelines are built with a [`DataPipelineBuilder`] and finalized with
/// [`DataPipelineBuilder::and_return`]. They are not `Clone`: the factories
/// [`DataPipeline::zip`] and [`DataPipeline::round_robin`] take pipelines by
/// value, so a handle cannot be observed after it has been composed.
pub struct DataPipeline {
    // Declared first so a tracked pipeline deregisters before its state drops.
    pub(crate) registration: Option<Registration>,
    pub(crate) state: Arc<Mutex<PipelineState>>,
}

impl DataPipeline {
    /// Wrap a root data source.
    #[must_use]
    pub fn from_source(source: BoxedSource) -> Self {
        Self {
            registration: None,
            state: Arc::new(Mutex::new(PipelineState {
                source,
                status: PipelineStatus::Active,
            })),
        }
    }

    /// Pull the next record, or `None` once this pass is over.
    ///
    /// # Errors
    ///
    /// Returns the error raised by the graph, which breaks the pipeline, or
    /// [`Error::Broken`] if it was already broken.
    pub fn next(&mut self) -> Result<Option<Data>> {
        lock(&self.state).next()
    }

    /// Rewind to the start, stopping background work, and clear the broken state.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be rewound.
    pub fn reset(&mut self) -> Result<()> {
        lock(&self.state).reset()
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.status() == PipelineStatus::Broken
    }

    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        lock(&self.state).status()
    }

    /// Append the current position to `tape`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Broken`] on a broken pipeline, or with the error
    /// raised while recording (which breaks the pipeline).
    pub fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        lock(&self.state).record_position(tape)
    }

    /// Restore a position written by [`DataPipeline::record_position`].
    ///
    /// # Errors
    ///
    /// Returns a pipeline error if the tape does not match this graph, which
    /// breaks the pipeline.
    pub fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        lock(&self.state).reload_position(tape)
    }

    /// Capture the position as a checkpoint document.
    ///
    /// # Errors
    ///
    /// See [`DataPipeline::record_position`].
    pub fn state_dict(&mut self) -> Result<StateDict> {
        let mut tape = Tape::new();
        self.record_position(&mut tape)?;

        let mut state = StateDict::new();
        state.insert(POSITION_KEY.to_string(), Data::List(tape.into_storage()));
        Ok(state)
    }

    /// Restore a checkpoint document produced by [`DataPipeline::state_dict`].
    ///
    /// A missing [`POSITION_KEY`] is ignored unless `strict` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] without touching the pipeline if the
    /// document is missing the key (in strict mode) or holds something other
    /// than a position list. Returns a pipeline error, and breaks the
    /// pipeline, if the position does not match this graph.
    pub fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<()> {
        let Some(value) = state.get(POSITION_KEY) else {
            if strict {
                return Err(Error::invalid_argument(format!(
                    "`state_dict` must contain a `{POSITION_KEY}` entry."
                )));
            }
            return Ok(());
        };

        let Data::List(storage) = value else {
            return Err(Error::invalid_argument(
                "`state_dict` must contain a valid data pipeline state, but cannot be parsed as such.",
            ));
        };

        let mut tape = Tape::from_storage(storage.clone());

        let mut guard = lock(&self.state);
        guard.reload_position(&mut tape)?;
        if !tape.is_eod() {
            return Err(guard.fail(Error::pipeline(
                "The tape holds more values than the data pipeline has consumed; it was recorded from a different pipeline.",
            )));
        }
        Ok(())
    }

    /// Iterate over the remaining records of this pass.
    ///
    /// The iterator yields each error once and then ends.
    pub fn iter(&mut self) -> DataPipelineIter<'_> {
        DataPipelineIter {
            pipeline: self,
            done: false,
        }
    }

    /// Join several pipelines positionally into one record per pull.
    #[must_use]
    pub fn zip(pipelines: Vec<DataPipeline>, options: ZipOptions) -> DataPipelineBuilder {
        DataPipelineBuilder::from_result(
            ZippedDataSource::new(pipelines, options).map(|s| Box::new(s) as BoxedSource),
        )
    }

    /// Pull one record from each pipeline in turn until all are exhausted.
    #[must_use]
    pub fn round_robin(pipelines: Vec<DataPipeline>) -> DataPipelineBuilder {
        DataPipelineBuilder::from_source(Box::new(RoundRobinDataSource::new(pipelines)))
    }
}

impl std::fmt::Debug for DataPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPipeline")
            .field("status", &self.status())
            .field("tracked", &self.registration.is_some())
            .finish_non_exhaustive()
    }
}

/// Iterator returned by [`DataPipeline::iter`].
pub struct DataPipelineIter<'a> {
    pipeline: &'a mut DataPipeline,
    done: bool,
}

impl Iterator for DataPipelineIter<'_> {
    type Item = Result<Data>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pipeline.next() {
            Ok(Some(data)) => Some(Ok(data)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
