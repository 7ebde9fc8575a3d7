//! Transfer manager: admission control and bookkeeping for concurrent tasks.
//!
//! The manager owns every task it accepts until the task's terminal callback.
//! It rejects a second start for an id that is still in flight, and a start
//! whose destination is already known to be complete and still on disk.
//! Completed entries whose file vanished are pruned before that check, so an
//! externally deleted file can be fetched again.
//!
//! At most `max_concurrent` tasks run at once; the rest wait in FIFO order
//! in the `Waiting` state. One coarse mutex guards the manager's collections;
//! the copy loop never takes it.
//!
//! The completed-destination check is a plain existence test at admission
//! time. It is not atomic with respect to the copy that follows: a file
//! deleted or created in between is not noticed.

mod completed;
mod managed_sink;
mod slots;

pub use completed::CompletedCache;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::XferConfig;
use crate::error::{ControlError, StartRejected};
use crate::sink::ProgressSink;
use crate::storage::{destination_for, LocalStorage, Storage};
use crate::task::{TaskHandle, TaskOptions, TaskSnapshot, TaskState, TransferTask};
use managed_sink::{ManagedSink, Terminal};
use slots::WorkerSlots;

/// Default number of concurrently running tasks.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Options applied to every task this manager creates.
    pub task: TaskOptions,
    /// Worker slots; `None` runs every accepted task immediately.
    pub max_concurrent: Option<usize>,
    /// Where to persist the completed set; `None` keeps it in memory only.
    pub completed_cache_path: Option<PathBuf>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            task: TaskOptions::default(),
            max_concurrent: Some(DEFAULT_MAX_CONCURRENT),
            completed_cache_path: None,
        }
    }
}

impl ManagerOptions {
    /// Build options from the loaded config. The cache path is resolved from
    /// the XDG state dir when persistence is enabled.
    pub fn from_config(cfg: &XferConfig) -> Self {
        let completed_cache_path = if cfg.persist_completed {
            match CompletedCache::default_path() {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!("completed cache disabled: {:#}", e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            task: cfg.task_options(),
            max_concurrent: cfg.worker_slots(),
            completed_cache_path,
        }
    }
}

/// What to copy where, under which stable id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub id: String,
    pub source: String,
    pub destination: String,
}

impl TransferRequest {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Request for an asset placed into `dir` under its own file name.
    /// The file name doubles as the id, so ids map 1:1 to destinations.
    pub fn for_asset(source: &Path, dir: &Path) -> Option<Self> {
        let destination = destination_for(source, dir)?;
        let id = source.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            id,
            source: source.to_string_lossy().into_owned(),
            destination: destination.to_string_lossy().into_owned(),
        })
    }
}

#[derive(Default)]
struct ManagerState {
    active: HashMap<String, TaskHandle>,
    in_flight: HashSet<String>,
    completed: CompletedCache,
    pending: VecDeque<(TransferTask, Arc<ManagedSink>)>,
    /// Terminal callbacks that updated bookkeeping but have not yet returned
    /// from the caller's sink.
    finishing: usize,
}

pub(crate) struct Inner {
    options: ManagerOptions,
    storage: Arc<dyn Storage>,
    state: Mutex<ManagerState>,
    idle: Condvar,
    slots: WorkerSlots,
    workers: Mutex<Vec<JoinHandle<TaskState>>>,
}

/// Owner of all active transfers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TransferManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.lock_state();
        f.debug_struct("TransferManager")
            .field("active", &st.active.len())
            .field("pending", &st.pending.len())
            .field("running", &self.inner.slots.in_use())
            .field("completed", &st.completed.len())
            .finish()
    }
}

impl TransferManager {
    pub fn new(options: ManagerOptions, storage: Arc<dyn Storage>) -> Self {
        let completed = match &options.completed_cache_path {
            Some(path) => {
                match CompletedCache::load_from_path(path, |d| storage.destination_exists(d)) {
                    Ok(Some(cache)) => {
                        tracing::debug!(entries = cache.len(), "loaded completed set from {}", path.display());
                        cache
                    }
                    Ok(None) => CompletedCache::new(),
                    Err(e) => {
                        tracing::warn!("ignoring completed set: {:#}", e);
                        CompletedCache::new()
                    }
                }
            }
            None => CompletedCache::new(),
        };
        let slots = WorkerSlots::new(options.max_concurrent);
        Self {
            inner: Arc::new(Inner {
                options,
                storage,
                state: Mutex::new(ManagerState {
                    completed,
                    ..ManagerState::default()
                }),
                idle: Condvar::new(),
                slots,
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Manager over the local filesystem.
    pub fn local(options: ManagerOptions) -> Self {
        Self::new(options, Arc::new(LocalStorage))
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.inner.options
    }

    /// Accept a transfer and dispatch it (or queue it while all slots are busy).
    pub fn start_transfer(
        &self,
        request: TransferRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<TaskHandle, StartRejected> {
        let inner = &self.inner;
        let (handle, dispatch) = {
            let mut st = inner.lock_state();
            if st.in_flight.contains(&request.id) {
                tracing::info!(id = %request.id, "rejected: already downloading");
                return Err(StartRejected::AlreadyInFlight(request.id));
            }
            let pruned = st
                .completed
                .prune(|d| inner.storage.destination_exists(d));
            if pruned > 0 {
                tracing::debug!(pruned, "dropped completed entries whose file is gone");
                inner.persist(&st.completed);
            }
            if st.completed.contains(&request.destination) {
                tracing::info!(id = %request.id, destination = %request.destination, "rejected: already downloaded");
                return Err(StartRejected::AlreadyCompleted(request.id));
            }

            let TransferRequest {
                id,
                source,
                destination,
            } = request;
            st.in_flight.insert(id.clone());
            let managed = Arc::new(ManagedSink::new(
                id.clone(),
                destination.clone(),
                Arc::downgrade(&self.inner),
                sink,
            ));
            let task = TransferTask::new(
                id.clone(),
                source,
                destination,
                Arc::clone(&inner.storage),
                Arc::clone(&managed) as Arc<dyn ProgressSink>,
                inner.options.task,
            );
            let handle = task.handle();
            st.active.insert(id.clone(), handle.clone());

            if st.pending.is_empty() && inner.slots.try_acquire() {
                (handle, Some((task, managed)))
            } else {
                tracing::debug!(%id, queued = st.pending.len() + 1, "all worker slots busy; queued");
                st.pending.push_back((task, managed));
                (handle, None)
            }
        };
        if let Some((task, managed)) = dispatch {
            inner.launch(task, managed);
        }
        Ok(handle)
    }

    pub fn pause_transfer(&self, id: &str) -> Result<(), ControlError> {
        self.handle(id)?.pause();
        Ok(())
    }

    pub fn resume_transfer(&self, id: &str) -> Result<(), ControlError> {
        self.handle(id)?.resume();
        Ok(())
    }

    /// Cancel a transfer. A queued task is dropped without touching the disk;
    /// a running or paused one deletes its partial output.
    pub fn cancel_transfer(&self, id: &str) -> Result<(), ControlError> {
        let unstarted = {
            let mut st = self.inner.lock_state();
            match st.pending.iter().position(|(t, _)| t.id() == id) {
                Some(pos) => st.pending.remove(pos).map(|(task, _)| task),
                None => None,
            }
        };
        match unstarted {
            Some(task) => {
                task.cancel_unstarted();
                Ok(())
            }
            None => {
                self.handle(id)?.cancel();
                Ok(())
            }
        }
    }

    pub fn set_speed(&self, id: &str, bytes_per_sec: u64) -> Result<(), ControlError> {
        self.handle(id)?.set_speed(bytes_per_sec);
        Ok(())
    }

    /// Control handle for an active (queued, running or paused) task.
    pub fn handle(&self, id: &str) -> Result<TaskHandle, ControlError> {
        self.inner
            .lock_state()
            .active
            .get(id)
            .cloned()
            .ok_or_else(|| ControlError::NotFound(id.to_string()))
    }

    pub fn snapshot(&self, id: &str) -> Option<TaskSnapshot> {
        self.handle(id).ok().map(|h| h.snapshot())
    }

    /// Snapshots of all active tasks, sorted by id.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let handles: Vec<TaskHandle> = self.inner.lock_state().active.values().cloned().collect();
        let mut snaps: Vec<TaskSnapshot> = handles.iter().map(TaskHandle::snapshot).collect();
        snaps.sort_by(|a, b| a.id.cmp(&b.id));
        snaps
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock_state().active.len()
    }

    /// Whether `destination` is recorded as complete and still exists.
    pub fn is_completed(&self, destination: &str) -> bool {
        self.inner.lock_state().completed.contains(destination)
            && self.inner.storage.destination_exists(destination)
    }

    /// Block until no task is active and every terminal callback has returned.
    pub fn wait_idle(&self) {
        let mut st = self.inner.lock_state();
        while !st.is_idle() {
            st = self.inner.idle.wait(st).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like `wait_idle` with a deadline. Returns false on timeout.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.inner.lock_state();
        while !st.is_idle() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            st = self
                .inner
                .idle
                .wait_timeout(st, deadline - now)
                .map(|(g, _)| g)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }

    /// Cancel everything and wait for all workers to exit.
    pub fn shutdown(&self) {
        let (queued, running) = {
            let mut st = self.inner.lock_state();
            let queued: Vec<TransferTask> = st.pending.drain(..).map(|(t, _)| t).collect();
            let running: Vec<TaskHandle> = st.active.values().cloned().collect();
            (queued, running)
        };
        tracing::info!(queued = queued.len(), running = running.len(), "shutting down");
        for task in queued {
            task.cancel_unstarted();
        }
        for handle in &running {
            handle.cancel();
        }
        self.wait_idle();
        let workers: Vec<JoinHandle<TaskState>> = {
            let mut w = self.inner.workers.lock().unwrap_or_else(|e| e.into_inner());
            w.drain(..).collect()
        };
        for w in workers {
            if w.join().is_err() {
                tracing::warn!("transfer worker panicked");
            }
        }
    }
}

impl ManagerState {
    fn is_idle(&self) -> bool {
        self.active.is_empty() && self.finishing == 0
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, completed: &CompletedCache) {
        if let Some(path) = &self.options.completed_cache_path {
            if let Err(e) = completed.save_to_path(path) {
                tracing::warn!("could not save completed set: {:#}", e);
            }
        }
    }

    /// Spawn a task that already holds a worker slot.
    fn launch(&self, task: TransferTask, managed: Arc<ManagedSink>) {
        managed.mark_slot_held();
        let id = task.id().to_string();
        match task.spawn() {
            Ok(handle) => {
                let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
                workers.retain(|w| !w.is_finished());
                workers.push(handle);
            }
            // The task already reported the failure through its sink.
            Err(e) => tracing::error!(%id, "failed to spawn transfer worker: {}", e),
        }
    }

    /// Start queued tasks while slots are free.
    fn dispatch_pending(&self) {
        loop {
            let next = {
                let mut st = self.lock_state();
                if st.pending.is_empty() || !self.slots.try_acquire() {
                    return;
                }
                st.pending.pop_front()
            };
            if let Some((task, managed)) = next {
                self.launch(task, managed);
            }
        }
    }

    pub(crate) fn on_terminal(&self, sink: &ManagedSink, terminal: Terminal, released_slot: bool) {
        {
            let mut st = self.lock_state();
            st.active.remove(&sink.id);
            st.in_flight.remove(&sink.id);
            if terminal == Terminal::Completed {
                st.completed.insert(sink.destination.clone());
                self.persist(&st.completed);
            }
            st.finishing += 1;
        }
        tracing::debug!(id = %sink.id, ?terminal, "task removed from manager");
        if released_slot {
            self.slots.release();
            self.dispatch_pending();
        }
    }

    pub(crate) fn after_terminal(&self) {
        let mut st = self.lock_state();
        st.finishing = st.finishing.saturating_sub(1);
        self.idle.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_for_asset_uses_file_name() {
        let r = TransferRequest::for_asset(Path::new("/music/a/song.wav"), Path::new("/dl")).unwrap();
        assert_eq!(r.id, "song.wav");
        assert_eq!(r.source, "/music/a/song.wav");
        assert_eq!(r.destination, "/dl/song.wav");
    }

    #[test]
    fn request_for_asset_without_name() {
        assert!(TransferRequest::for_asset(Path::new("/"), Path::new("/dl")).is_none());
    }

    #[test]
    fn control_on_unknown_id_is_not_found() {
        let m = TransferManager::local(ManagerOptions::default());
        assert_eq!(
            m.pause_transfer("nope"),
            Err(ControlError::NotFound("nope".into()))
        );
        assert!(m.resume_transfer("nope").is_err());
        assert!(m.cancel_transfer("nope").is_err());
        assert!(m.set_speed("nope", 10).is_err());
        assert!(m.snapshot("nope").is_none());
        assert!(m.wait_idle_timeout(Duration::from_millis(10)));
    }
}
