//! An explicit registry of live pipelines, used to stop background work at shutdown.
//!
//! Prefetch workers keep threads alive for as long as their pipeline exists.
//! A process that wants to exit cleanly creates one [`PipelineTracker`] at its
//! composition root, builds pipelines with
//! [`DataPipelineBuilder::and_return_tracked`](crate::DataPipelineBuilder::and_return_tracked),
//! and calls [`PipelineTracker::shutdown`] (or drops the last tracker handle)
//! before exiting.
//!
//! The registry holds weak references only, so it never keeps a pipeline
//! alive. A pipeline removes its own entry when dropped.

use crate::error::{Error, Result};
use crate::pipeline::{lock, DataPipeline, PipelineState, PipelineStatus};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error};

#[derive(Default)]
struct Registry {
    entries: Mutex<BTreeMap<u64, Weak<Mutex<PipelineState>>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn shutdown(&self) -> Result<()> {
        // Take the entries first so no lock on the registry is held while
        // pipelines reset.
        let entries = std::mem::take(&mut *lock(&self.entries));

        let mut dangling = Vec::new();
        for (id, weak) in entries {
            let Some(state) = weak.upgrade() else {
                dangling.push(id);
                continue;
            };

            let mut state = lock(&state);
            if state.status() == PipelineStatus::Broken {
                continue;
            }
            if let Err(e) = state.reset() {
                debug!(pipeline = id, "ignoring a reset failure during shutdown: {e}");
            }
        }

        if dangling.is_empty() {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "pipelines {dangling:?} were dropped without deregistering from the tracker"
            )))
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("the pipeline tracker failed to shut down cleanly: {e}");
        }
    }
}

/// A cloneable handle to a pipeline registry.
#[derive(Clone, Default)]
pub struct PipelineTracker {
    registry: Arc<Registry>,
}

impl PipelineTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pipeline`, replacing any earlier registration it carried.
    pub fn track(&self, pipeline: &mut DataPipeline) {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.registry.entries).insert(id, Arc::downgrade(&pipeline.state));

        pipeline.registration = Some(Registration {
            registry: Arc::downgrade(&self.registry),
            id,
        });
        debug!(pipeline = id, "pipeline registered with the tracker");
    }

    /// Number of registered pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.registry.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset every registered pipeline that is not broken, then clear the registry.
    ///
    /// Reset failures are ignored; the goal is only to stop background threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the registry held an entry for a pipeline
    /// that no longer exists.
    pub fn shutdown(&self) -> Result<()> {
        self.registry.shutdown()
    }
}

impl std::fmt::Debug for PipelineTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineTracker")
            .field("len", &self.len())
            .finish()
    }
}

/// Held by a tracked pipeline; removes its registry entry when dropped.
pub(crate) struct Registration {
    registry: Weak<Registry>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry.entries).remove(&self.id);
            debug!(pipeline = self.id, "pipeline deregistered from the tracker");
        }
    }
}
