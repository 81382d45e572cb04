//! Background save worker.
//!
//! [`AsyncSaveStorage`] owns a [`SaveStorage`] backend and a named worker
//! thread. The simulation thread enqueues batches with
//! [`AsyncSaveStorage::upsert`], which never blocks, and calls
//! [`AsyncSaveStorage::tick`] once per frame to collect results.
//!
//! The two threads exchange whole values over channels:
//!
//! - outbound, one [`UpsertTask`] per batch;
//! - inbound, one [`WorkerReport`] per processed batch, either the batch's
//!   callback (plus any buffer the backend offers for reuse) or the fault
//!   that prevented it from being written.
//!
//! The worker wakes every poll interval, drains every queued task, and
//! writes them while holding the store lock. A backend error never stops
//! the worker; it is reported and re-raised on the simulation thread, one
//! fault per tick, in the order the faults occurred.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use worldsync_types::ChangeForm;

use crate::error::{PersistError, StoreError};
use crate::storage::{ChangeFormBatch, SaveStorage};

/// How often the worker looks for queued batches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs on the simulation thread once its batch is durable.
pub type UpsertCallback = Box<dyn FnOnce() + Send>;

type SharedStore = Arc<Mutex<Box<dyn SaveStorage>>>;

/// A batch waiting to be written.
struct UpsertTask {
    batch: ChangeFormBatch,
    callback: UpsertCallback,
}

/// Outcome of one batch, sent back to the simulation thread.
enum WorkerReport {
    Completed {
        callback: UpsertCallback,
        recycled: Option<ChangeFormBatch>,
    },
    Failed(PersistError),
}

/// Non-blocking front end to a [`SaveStorage`] backend.
pub struct AsyncSaveStorage {
    name: String,
    store: SharedStore,
    tasks: Option<Sender<UpsertTask>>,
    reports: Receiver<WorkerReport>,
    worker: Option<JoinHandle<()>>,
    faults: VecDeque<PersistError>,
    completed: Vec<UpsertCallback>,
    recycled: VecDeque<ChangeFormBatch>,
    num_finished_upserts: u64,
    worker_gone_reported: bool,
}

impl core::fmt::Debug for AsyncSaveStorage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncSaveStorage")
            .field("name", &self.name)
            .field("faults", &self.faults.len())
            .field("completed", &self.completed.len())
            .field("num_finished_upserts", &self.num_finished_upserts)
            .finish_non_exhaustive()
    }
}

impl AsyncSaveStorage {
    /// Start a worker for `store` polling every [`DEFAULT_POLL_INTERVAL`].
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Spawn`] if the thread cannot be started.
    pub fn new(store: impl SaveStorage + 'static, name: &str) -> Result<Self, PersistError> {
        Self::with_poll_interval(store, name, DEFAULT_POLL_INTERVAL)
    }

    /// Start a worker for `store` with a custom poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Spawn`] if the thread cannot be started.
    pub fn with_poll_interval(
        store: impl SaveStorage + 'static,
        name: &str,
        poll_interval: Duration,
    ) -> Result<Self, PersistError> {
        let backend = store.name().to_owned();
        let boxed: Box<dyn SaveStorage> = Box::new(store);
        let store: SharedStore = Arc::new(Mutex::new(boxed));
        let (task_tx, task_rx) = mpsc::channel();
        let (report_tx, report_rx) = mpsc::channel();

        let worker_store = Arc::clone(&store);
        let worker_name = name.to_owned();
        let worker = thread::Builder::new()
            .name(format!("save-worker-{name}"))
            .spawn(move || {
                worker_main(&worker_store, &worker_name, &task_rx, &report_tx, poll_interval);
            })
            .map_err(PersistError::Spawn)?;

        tracing::info!(
            store = name,
            backend = %backend,
            poll_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX),
            "async save storage started"
        );

        Ok(Self {
            name: name.to_owned(),
            store,
            tasks: Some(task_tx),
            reports: report_rx,
            worker: Some(worker),
            faults: VecDeque::new(),
            completed: Vec::new(),
            recycled: VecDeque::new(),
            num_finished_upserts: 0,
            worker_gone_reported: false,
        })
    }

    /// Queue `batch` for writing. `callback` runs during the first
    /// [`Self::tick`] after the batch is durable.
    ///
    /// Never blocks. If the worker has stopped, the failure is reported by
    /// the next tick.
    pub fn upsert(&mut self, batch: ChangeFormBatch, callback: impl FnOnce() + Send + 'static) {
        let task = UpsertTask {
            batch,
            callback: Box::new(callback),
        };
        let sent = self.tasks.as_ref().is_some_and(|tx| tx.send(task).is_ok());
        if !sent {
            tracing::error!(store = %self.name, "save worker is gone, batch dropped");
            self.report_worker_gone();
        }
    }

    /// Collect worker results. Call once per simulation frame.
    ///
    /// If any fault is queued, the oldest one is returned and nothing else
    /// happens this tick. Otherwise every callback of a completed batch
    /// fires, in completion order, and [`Self::num_finished_upserts`]
    /// advances by one per batch.
    ///
    /// # Errors
    ///
    /// Returns the oldest queued [`PersistError`]. Each fault is returned
    /// exactly once.
    pub fn tick(&mut self) -> Result<(), PersistError> {
        self.collect_reports();
        if let Some(fault) = self.faults.pop_front() {
            return Err(fault);
        }
        for callback in core::mem::take(&mut self.completed) {
            self.num_finished_upserts = self.num_finished_upserts.saturating_add(1);
            callback();
        }
        Ok(())
    }

    /// Visit every stored snapshot, holding the store lock throughout.
    ///
    /// Meant for the startup load, before the server goes live.
    ///
    /// # Errors
    ///
    /// Returns whatever [`SaveStorage::iterate`] reports.
    pub fn iterate_sync(&self, visit: &mut dyn FnMut(ChangeForm)) -> Result<(), StoreError> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.iterate(visit)
    }

    /// An emptied batch buffer handed back by the backend, if any.
    pub fn recycled_buffer(&mut self) -> Option<ChangeFormBatch> {
        self.collect_reports();
        self.recycled.pop_front()
    }

    /// Number of batches whose callbacks have fired.
    pub const fn num_finished_upserts(&self) -> u64 {
        self.num_finished_upserts
    }

    /// Name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the worker after it has written everything queued so far, then
    /// fire the remaining callbacks.
    ///
    /// # Errors
    ///
    /// Returns the oldest fault still queued. Later faults are logged.
    pub fn close(mut self) -> Result<(), PersistError> {
        self.stop_worker();
        self.collect_reports();
        for callback in core::mem::take(&mut self.completed) {
            self.num_finished_upserts = self.num_finished_upserts.saturating_add(1);
            callback();
        }
        let first = self.faults.pop_front();
        for fault in self.faults.drain(..) {
            tracing::error!(store = %self.name, error = %fault, "persistence fault at shutdown");
        }
        first.map_or(Ok(()), Err)
    }

    fn collect_reports(&mut self) {
        loop {
            match self.reports.try_recv() {
                Ok(WorkerReport::Completed { callback, recycled }) => {
                    self.completed.push(callback);
                    self.recycled.extend(recycled);
                }
                Ok(WorkerReport::Failed(fault)) => self.faults.push_back(fault),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    if self.tasks.is_some() {
                        self.report_worker_gone();
                    }
                    return;
                }
            }
        }
    }

    fn report_worker_gone(&mut self) {
        if !self.worker_gone_reported {
            self.worker_gone_reported = true;
            self.faults
                .push_back(PersistError::WorkerGone(self.name.clone()));
        }
    }

    fn stop_worker(&mut self) {
        // Dropping the sender lets the worker drain and exit.
        self.tasks = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(store = %self.name, "save worker panicked");
            }
        }
    }
}

impl Drop for AsyncSaveStorage {
    fn drop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        self.stop_worker();
        self.collect_reports();
        for fault in self.faults.drain(..) {
            tracing::error!(store = %self.name, error = %fault, "persistence fault at shutdown");
        }
        tracing::info!(
            store = %self.name,
            finished_upserts = self.num_finished_upserts,
            unfired_callbacks = self.completed.len(),
            "async save storage stopped"
        );
    }
}

// ---------------------------------------------------------------------------
// Worker thread
// ---------------------------------------------------------------------------

fn worker_main(
    store: &SharedStore,
    name: &str,
    tasks: &Receiver<UpsertTask>,
    reports: &Sender<WorkerReport>,
    poll_interval: Duration,
) {
    loop {
        thread::sleep(poll_interval);
        let (pending, disconnected) = drain_tasks(tasks);
        if !pending.is_empty() {
            save_batches(store, name, pending, reports);
        }
        if disconnected {
            break;
        }
    }
    tracing::debug!(store = name, "save worker exiting");
}

fn drain_tasks(tasks: &Receiver<UpsertTask>) -> (Vec<UpsertTask>, bool) {
    let mut pending = Vec::new();
    loop {
        match tasks.try_recv() {
            Ok(task) => pending.push(task),
            Err(TryRecvError::Empty) => return (pending, false),
            Err(TryRecvError::Disconnected) => return (pending, true),
        }
    }
}

fn save_batches(
    store: &SharedStore,
    name: &str,
    pending: Vec<UpsertTask>,
    reports: &Sender<WorkerReport>,
) {
    let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
    let start = Instant::now();
    let mut saved: usize = 0;

    for UpsertTask { batch, callback } in pending {
        let batch_len = batch.len();
        let report = match store.upsert(batch) {
            Ok(written) => {
                saved = saved.saturating_add(written);
                WorkerReport::Completed {
                    callback,
                    recycled: store.recycled_buffer(),
                }
            }
            Err(source) => {
                tracing::error!(store = name, batch_len, error = %source, "failed to save batch");
                WorkerReport::Failed(PersistError::Upsert {
                    store: name.to_owned(),
                    batch_len,
                    source,
                })
            }
        };
        if reports.send(report).is_err() {
            tracing::debug!(store = name, "save storage dropped before report delivery");
        }
    }

    if saved > 0 {
        tracing::trace!(store = name, count = saved, elapsed = ?start.elapsed(), "saved change forms");
    }
}
