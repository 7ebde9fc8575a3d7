//! Sink that records every notification and lets tests wait for the terminal one.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use xfer_core::{ProgressSink, TransferError};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Progress(f64),
    Error(String),
    Cancelled,
    Completed,
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Progress(_))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    changed: Condvar,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, e: Event) {
        self.events.lock().unwrap().push(e);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn progress_count(&self) -> usize {
        self.progress().len()
    }

    pub fn terminals(&self) -> Vec<Event> {
        self.events().into_iter().filter(Event::is_terminal).collect()
    }

    /// Waits until `pred` holds for the recorded events, or the timeout passes.
    pub fn wait_for<F>(&self, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&[Event]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().unwrap();
        loop {
            if pred(&events) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = self.changed.wait_timeout(events, deadline - now).unwrap().0;
        }
    }

    /// Waits for the terminal event and returns it.
    pub fn wait_terminal(&self, timeout: Duration) -> Option<Event> {
        if !self.wait_for(timeout, |ev| ev.iter().any(Event::is_terminal)) {
            return None;
        }
        self.terminals().into_iter().next()
    }

    pub fn wait_progress(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |ev| ev.iter().any(|e| matches!(e, Event::Progress(_))))
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, fraction: f64) {
        self.push(Event::Progress(fraction));
    }

    fn on_error(&self, error: &TransferError) {
        self.push(Event::Error(error.to_string()));
    }

    fn on_cancelled(&self) {
        self.push(Event::Cancelled);
    }

    fn on_completed(&self) {
        self.push(Event::Completed);
    }
}
