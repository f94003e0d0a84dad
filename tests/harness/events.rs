//! Event capture for lifecycle assertions

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use aerodb_journal_client::client::{ClientEvent, EventCallback};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<ClientEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: ClientEvent) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }

    /// Wait until `event` has been seen at least once.
    pub fn wait_for(&self, event: ClientEvent, timeout: Duration) -> bool {
        wait_until(timeout, || self.count(event) > 0)
    }
}

impl EventCallback for EventRecorder {
    fn on_event(&self, event: ClientEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
