//! Integration tests: manager admission rules, worker slots, completed-set
//! persistence and shutdown.

mod common;

use std::path::Path;
use std::time::Duration;

use common::fixtures::{manager, request, source_file};
use common::recording_sink::{Event, RecordingSink};
use tempfile::tempdir;
use xfer_core::{
    ControlError, ManagerOptions, StartRejected, TaskOptions, TaskState, TransferManager,
};

#[test]
fn duplicate_start_is_rejected_while_in_flight() {
    let dir = tempdir().unwrap();
    let src = source_file(dir.path(), "dup.wav", 512 * 1024);
    let req = request(&src, dir.path());
    let id = req.id.clone();

    let m = manager(64 * 1024, Some(5));
    let first = RecordingSink::new();
    m.start_transfer(req.clone(), first.clone()).unwrap();

    let second = RecordingSink::new();
    assert_eq!(
        m.start_transfer(req, second.clone()).unwrap_err(),
        StartRejected::AlreadyInFlight(id.clone())
    );

    m.cancel_transfer(&id).unwrap();
    assert_eq!(first.wait_terminal(Duration::from_secs(5)), Some(Event::Cancelled));
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
    assert!(second.events().is_empty(), "rejected sink is never called");
}

#[test]
fn completed_destination_is_not_downloaded_again_until_deleted() {
    let dir = tempdir().unwrap();
    let src = source_file(dir.path(), "again.wav", 20 * 1024);
    let req = request(&src, dir.path());
    let id = req.id.clone();
    let dst = req.destination.clone();

    let m = manager(0, Some(5));
    let rec = RecordingSink::new();
    m.start_transfer(req.clone(), rec.clone()).unwrap();
    assert_eq!(rec.wait_terminal(Duration::from_secs(5)), Some(Event::Completed));
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
    assert!(m.is_completed(&dst));

    assert_eq!(
        m.start_transfer(req.clone(), RecordingSink::new()).unwrap_err(),
        StartRejected::AlreadyCompleted(id)
    );

    std::fs::remove_file(&dst).unwrap();
    assert!(!m.is_completed(&dst));
    let retry = RecordingSink::new();
    m.start_transfer(req, retry.clone())
        .expect("deleted destination must be downloadable again");
    assert_eq!(retry.wait_terminal(Duration::from_secs(5)), Some(Event::Completed));
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
    assert!(Path::new(&dst).exists());
}

#[test]
fn queued_tasks_wait_for_a_free_slot() {
    let dir = tempdir().unwrap();
    let slow = source_file(dir.path(), "slow.wav", 4 * 1024 * 1024);
    let quick = source_file(dir.path(), "quick.wav", 8 * 1024);
    let later = source_file(dir.path(), "later.wav", 8 * 1024);
    let slow_req = request(&slow, dir.path());
    let quick_req = request(&quick, dir.path());
    let later_req = request(&later, dir.path());

    let m = manager(64 * 1024, Some(1));
    let slow_rec = RecordingSink::new();
    m.start_transfer(slow_req.clone(), slow_rec.clone()).unwrap();
    assert!(slow_rec.wait_progress(Duration::from_secs(5)));

    let quick_rec = RecordingSink::new();
    let quick_handle = m.start_transfer(quick_req.clone(), quick_rec.clone()).unwrap();
    assert_eq!(quick_handle.state(), TaskState::Waiting);
    assert_eq!(m.active_count(), 2);
    // Pause is only meaningful once the task runs.
    assert!(!quick_handle.pause());

    // Cancelling a queued task never touches the disk.
    m.cancel_transfer(&quick_req.id).unwrap();
    assert_eq!(quick_rec.wait_terminal(Duration::from_secs(2)), Some(Event::Cancelled));
    assert_eq!(quick_rec.events(), vec![Event::Cancelled]);
    assert!(!Path::new(&quick_req.destination).exists());
    assert!(matches!(
        m.cancel_transfer(&quick_req.id),
        Err(ControlError::NotFound(_))
    ));

    let later_rec = RecordingSink::new();
    let later_handle = m.start_transfer(later_req.clone(), later_rec.clone()).unwrap();
    assert_eq!(later_handle.state(), TaskState::Waiting);

    // Freeing the only slot dispatches the queued task.
    m.cancel_transfer(&slow_req.id).unwrap();
    assert_eq!(slow_rec.wait_terminal(Duration::from_secs(5)), Some(Event::Cancelled));
    assert_eq!(later_rec.wait_terminal(Duration::from_secs(5)), Some(Event::Completed));
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
    assert!(Path::new(&later_req.destination).exists());
    assert!(!Path::new(&slow_req.destination).exists());
}

#[test]
fn unbounded_manager_runs_all_tasks_at_once() {
    let dir = tempdir().unwrap();
    let m = manager(32 * 1024, None);
    let mut sinks = Vec::new();
    for i in 0..8 {
        let src = source_file(dir.path(), &format!("t{i}.wav"), 64 * 1024);
        let rec = RecordingSink::new();
        let h = m.start_transfer(request(&src, dir.path()), rec.clone()).unwrap();
        sinks.push((h, rec));
    }
    for (_, rec) in &sinks {
        assert!(rec.wait_progress(Duration::from_secs(5)));
    }
    assert!(sinks.iter().all(|(h, _)| h.state() != TaskState::Waiting));
    assert_eq!(m.list().len(), 8);

    m.shutdown();
    for (h, rec) in &sinks {
        assert_eq!(rec.terminals(), vec![Event::Cancelled]);
        assert_eq!(h.state(), TaskState::Cancelled);
    }
    assert_eq!(m.active_count(), 0);
}

#[test]
fn shutdown_cancels_running_and_queued_tasks() {
    let dir = tempdir().unwrap();
    let a = source_file(dir.path(), "a.wav", 2 * 1024 * 1024);
    let b = source_file(dir.path(), "b.wav", 2 * 1024 * 1024);
    let m = manager(64 * 1024, Some(1));
    let ra = RecordingSink::new();
    let rb = RecordingSink::new();
    m.start_transfer(request(&a, dir.path()), ra.clone()).unwrap();
    m.start_transfer(request(&b, dir.path()), rb.clone()).unwrap();

    m.shutdown();
    assert_eq!(ra.terminals(), vec![Event::Cancelled]);
    assert_eq!(rb.terminals(), vec![Event::Cancelled]);
    assert!(m.list().is_empty());
    assert!(!dir.path().join("out/a.wav").exists());
    assert!(!dir.path().join("out/b.wav").exists());
}

#[test]
fn completed_set_survives_restart_and_is_revalidated() {
    let dir = tempdir().unwrap();
    let src = source_file(dir.path(), "persist.wav", 4 * 1024);
    let req = request(&src, dir.path());
    let cache_path = dir.path().join("state/completed.json");
    let options = ManagerOptions {
        task: TaskOptions {
            speed_limit_bytes_per_sec: 0,
            ..TaskOptions::default()
        },
        max_concurrent: Some(2),
        completed_cache_path: Some(cache_path.clone()),
    };

    {
        let m = TransferManager::local(options.clone());
        let rec = RecordingSink::new();
        m.start_transfer(req.clone(), rec.clone()).unwrap();
        assert_eq!(rec.wait_terminal(Duration::from_secs(5)), Some(Event::Completed));
        assert!(m.wait_idle_timeout(Duration::from_secs(5)));
    }
    assert!(cache_path.exists());

    let m = TransferManager::local(options.clone());
    assert!(matches!(
        m.start_transfer(req.clone(), RecordingSink::new()),
        Err(StartRejected::AlreadyCompleted(_))
    ));

    std::fs::remove_file(&req.destination).unwrap();
    let m = TransferManager::local(options);
    assert!(!m.is_completed(&req.destination));
    let rec = RecordingSink::new();
    m.start_transfer(req, rec.clone()).unwrap();
    assert_eq!(rec.wait_terminal(Duration::from_secs(5)), Some(Event::Completed));
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
}

#[test]
fn retry_from_terminal_callback_is_accepted() {
    use std::sync::{Arc, Mutex};
    use xfer_core::{ProgressSink, TransferError, TransferRequest};

    // Retries the transfer once from inside `on_error`.
    struct RetryOnce {
        manager: TransferManager,
        request: TransferRequest,
        outcome: Mutex<Option<Result<(), StartRejected>>>,
    }

    impl ProgressSink for RetryOnce {
        fn on_progress(&self, _fraction: f64) {}
        fn on_error(&self, _error: &TransferError) {
            let res = self
                .manager
                .start_transfer(self.request.clone(), Arc::new(xfer_core::LogSink::new("retry")))
                .map(|_| ());
            *self.outcome.lock().unwrap() = Some(res);
        }
        fn on_cancelled(&self) {}
        fn on_completed(&self) {}
    }

    let dir = tempdir().unwrap();
    let req = request(&dir.path().join("missing.wav"), dir.path());
    let m = manager(0, Some(1));
    let sink = Arc::new(RetryOnce {
        manager: m.clone(),
        request: req.clone(),
        outcome: Mutex::new(None),
    });
    m.start_transfer(req, sink.clone()).unwrap();
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
    assert_eq!(*sink.outcome.lock().unwrap(), Some(Ok(())));
}

#[test]
fn id_with_nul_byte_is_transferred() {
    use xfer_core::TransferRequest;

    let dir = tempdir().unwrap();
    let src = source_file(dir.path(), "nul.wav", 4 * 1024);
    let dst = dir.path().join("out/nul.wav");
    let m = manager(0, Some(1));
    let rec = RecordingSink::new();
    m.start_transfer(
        TransferRequest::new("bad\0id", src.to_str().unwrap(), dst.to_str().unwrap()),
        rec.clone(),
    )
    .expect("ids are opaque strings");

    assert_eq!(rec.wait_terminal(Duration::from_secs(5)), Some(Event::Completed));
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
    assert!(dst.exists());
    assert_eq!(m.active_count(), 0);
}

#[test]
fn panicking_sink_releases_its_slot_and_id() {
    use std::sync::{Arc, Mutex};
    use xfer_core::{ProgressSink, TransferError};

    #[derive(Default)]
    struct PanicsOnProgress {
        errors: Mutex<Vec<String>>,
    }

    impl ProgressSink for PanicsOnProgress {
        fn on_progress(&self, _fraction: f64) {
            panic!("sink failure");
        }
        fn on_error(&self, error: &TransferError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
        fn on_cancelled(&self) {}
        fn on_completed(&self) {}
    }

    let dir = tempdir().unwrap();
    let src = source_file(dir.path(), "b.wav", 8 * 1024);
    let req = request(&src, dir.path());
    let m = manager(0, Some(1));

    let sink = Arc::new(PanicsOnProgress::default());
    let handle = m.start_transfer(req.clone(), sink.clone()).unwrap();
    assert!(m.wait_idle_timeout(Duration::from_secs(5)), "manager wedged after worker panic");
    assert_eq!(m.active_count(), 0);
    assert_eq!(handle.state(), TaskState::Errored);
    {
        let errors = sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("sink failure"), "{}", errors[0]);
    }

    // Same id, and the single worker slot is free again.
    let retry = RecordingSink::new();
    m.start_transfer(req, retry.clone()).unwrap();
    assert_eq!(retry.wait_terminal(Duration::from_secs(5)), Some(Event::Completed));
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
}

#[test]
fn panicking_terminal_callback_does_not_block_idle() {
    use std::sync::Arc;
    use xfer_core::{ProgressSink, TransferError};

    struct PanicsOnCompleted;

    impl ProgressSink for PanicsOnCompleted {
        fn on_progress(&self, _fraction: f64) {}
        fn on_error(&self, _error: &TransferError) {}
        fn on_cancelled(&self) {}
        fn on_completed(&self) {
            panic!("completion handler failure");
        }
    }

    let dir = tempdir().unwrap();
    let src = source_file(dir.path(), "c.wav", 2 * 1024);
    let req = request(&src, dir.path());
    let dst = req.destination.clone();
    let m = manager(0, Some(1));

    let handle = m.start_transfer(req, Arc::new(PanicsOnCompleted)).unwrap();
    assert!(m.wait_idle_timeout(Duration::from_secs(5)));
    assert_eq!(handle.state(), TaskState::Completed);
    assert!(m.is_completed(&dst));
}
