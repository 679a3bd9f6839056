//! `prefetch`: read ahead of the consumer on a background thread.
//!
//! A single worker thread owns the upstream source while it runs. It pulls
//! records and pushes them into a bounded channel, blocking when the channel
//! is full. Upstream failures travel through the channel like records and are
//! raised on the consumer thread at the matching pull.
//!
//! Stopping the worker is always done in this order: raise the stop flag,
//! drain the channel so a blocked push can complete, join the thread to get
//! the upstream source back, then drain whatever was pushed last.

use crate::data::Data;
use crate::error::{Error, Result};
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

enum Fetched {
    Record(Data),
    Failed(Error),
    Exhausted,
}

struct Worker {
    handle: JoinHandle<BoxedSource>,
    stop: Arc<AtomicBool>,
    queue: Receiver<Fetched>,
}

pub struct PrefetchedDataSource {
    // `None` while the worker owns the source.
    inner: Option<BoxedSource>,
    num_examples: usize,
    worker: Option<Worker>,
    // Fetched items recovered from a stopped worker, delivered before
    // anything the next worker produces.
    pending: VecDeque<Fetched>,
    finished: bool,
}

impl PrefetchedDataSource {
    pub(crate) fn new(inner: BoxedSource, num_examples: usize) -> Self {
        Self {
            inner: Some(inner),
            num_examples,
            worker: None,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn inner_mut(&mut self) -> Result<&mut BoxedSource> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::Internal("the prefetch upstream source has been lost".into()))
    }

    fn start_worker(&mut self) -> Result<()> {
        let Some(inner) = self.inner.take() else {
            return Err(Error::Internal("the prefetch upstream source has been lost".into()));
        };

        let (tx, rx) = bounded(self.num_examples);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("datapipe-prefetch".into())
            .spawn(move || run_worker(inner, &tx, &worker_stop))
            .map_err(|e| Error::Internal(format!("cannot start the prefetch thread: {e}")))?;

        debug!(capacity = self.num_examples, "prefetch worker started");

        self.worker = Some(Worker {
            handle,
            stop,
            queue: rx,
        });
        Ok(())
    }

    /// Stop the worker, if any, keeping everything it fetched in `pending`.
    fn stop_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        worker.stop.store(true, Ordering::SeqCst);
        self.pending.extend(worker.queue.try_iter());

        let joined = worker.handle.join();

        self.pending.extend(worker.queue.try_iter());

        match joined {
            Ok(inner) => {
                self.inner = Some(inner);
                debug!("prefetch worker stopped");
                Ok(())
            }
            Err(_) => Err(Error::Internal("the prefetch thread has panicked".into())),
        }
    }

    fn deliver(&mut self, fetched: Fetched) -> Result<Option<Data>> {
        match fetched {
            Fetched::Record(data) => Ok(Some(data)),
            Fetched::Exhausted => {
                self.finished = true;
                self.stop_worker()?;
                Ok(None)
            }
            Fetched::Failed(e) => {
                self.stop_worker()?;
                Err(e)
            }
        }
    }
}

fn run_worker(mut inner: BoxedSource, queue: &Sender<Fetched>, stop: &AtomicBool) -> BoxedSource {
    while !stop.load(Ordering::SeqCst) {
        let fetched = match inner.next() {
            Ok(Some(data)) => Fetched::Record(data),
            Ok(None) => Fetched::Exhausted,
            Err(e) => Fetched::Failed(e),
        };
        let last = !matches!(fetched, Fetched::Record(_));

        // Blocks while the queue is full. Stopping drains the queue, so at
        // most this one item lands after the stop flag is raised.
        if queue.send(fetched).is_err() || last {
            break;
        }
    }
    inner
}

impl DataSource for PrefetchedDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        if self.num_examples == 0 {
            return self.inner_mut()?.next();
        }

        if let Some(fetched) = self.pending.pop_front() {
            return self.deliver(fetched);
        }

        if self.finished {
            return Ok(None);
        }

        if self.worker.is_none() {
            self.start_worker()?;
        }

        let received = match &self.worker {
            Some(worker) => worker.queue.recv().ok(),
            None => None,
        };

        match received {
            Some(fetched) => self.deliver(fetched),
            None => {
                // The worker hung up without a terminal item; it can only have panicked.
                self.stop_worker()?;
                Err(Error::Internal("the prefetch thread has stopped unexpectedly".into()))
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        let stopped = self.stop_worker();
        self.pending.clear();
        self.finished = false;
        stopped?;
        self.inner_mut()?.reset()
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        if self.num_examples == 0 {
            return self.inner_mut()?.record_position(tape);
        }

        self.stop_worker()?;
        self.inner_mut()?.record_position(tape)?;

        // The worker stops after a terminal item, so a failure or the end of
        // input can only be the last pending item.
        let mut records = Vec::with_capacity(self.pending.len());
        let mut exhausted = self.finished;
        let mut failure = None;
        for fetched in &self.pending {
            match fetched {
                Fetched::Record(data) => records.push(data.clone()),
                Fetched::Exhausted => exhausted = true,
                Fetched::Failed(e) => failure = Some(e),
            }
        }

        tape.record(&records);
        tape.record(&exhausted);
        tape.record_failure(failure);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        let stopped = self.stop_worker();
        self.pending.clear();
        self.finished = false;
        stopped?;

        if self.num_examples == 0 {
            return self.inner_mut()?.reload_position(tape);
        }

        self.inner_mut()?.reload_position(tape)?;

        let records: Vec<Data> = tape.read()?;
        let exhausted: bool = tape.read()?;
        let failure = tape.read_failure()?;

        self.pending.extend(records.into_iter().map(Fetched::Record));
        if let Some(e) = failure {
            self.pending.push_back(Fetched::Failed(e));
        } else if exhausted {
            self.pending.push_back(Fetched::Exhausted);
        }
        Ok(())
    }
}

impl Drop for PrefetchedDataSource {
    fn drop(&mut self) {
        if self.stop_worker().is_err() {
            debug!("the prefetch worker panicked before shutdown");
        }
    }
}
