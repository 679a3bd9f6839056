//! The capability shared by leaf sources and operators.

use crate::data::Data;
use crate::error::Result;
use crate::tape::Tape;

/// A pull-based, restartable, checkpointable stream of records.
///
/// Leaf sources and operators implement the same four operations and compose
/// by ownership: an operator exclusively owns the source(s) it wraps.
///
/// After `next` has returned `Ok(None)`, further calls keep returning
/// `Ok(None)` until `reset` is called.
pub trait DataSource: Send {
    /// Pull the next record, or `None` at the end of the stream.
    fn next(&mut self) -> Result<Option<Data>>;

    /// Rewind this source and everything upstream to the start, stopping any
    /// background work first.
    fn reset(&mut self) -> Result<()>;

    /// Append the resumption state of the upstream source(s), then of this one.
    fn record_position(&mut self, tape: &mut Tape) -> Result<()>;

    /// Restore a position written by [`DataSource::record_position`], reading
    /// the tape in the same order. Any current state is discarded first.
    fn reload_position(&mut self, tape: &mut Tape) -> Result<()>;
}

/// A heap-allocated data source, as stored inside operators and pipelines.
pub type BoxedSource = Box<dyn DataSource>;
