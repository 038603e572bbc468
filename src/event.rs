use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::engine::scoring::elapsed_whole_secs;

/// Background clock that reports whole seconds elapsed since `started_at`.
///
/// One thread per ticker. `cancel` (or drop) stops the thread and discards any
/// tick that was already queued, so nothing is observed after cancellation.
pub struct Ticker {
    rx: mpsc::Receiver<u64>,
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(started_at: DateTime<Utc>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let secs = elapsed_whole_secs(started_at, Utc::now());
                        if tx.send(secs).is_err() {
                            return;
                        }
                    }
                    // Stop requested or ticker dropped.
                    _ => return,
                }
            }
        });

        Self {
            rx,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn every_second(started_at: DateTime<Utc>) -> Self {
        Self::start(started_at, Duration::from_secs(1))
    }

    /// Most recent tick since the last call, if any arrived.
    pub fn latest(&self) -> Option<u64> {
        self.rx.try_iter().last()
    }

    /// Block until the next tick. `None` once cancelled.
    pub fn wait(&self, timeout: Duration) -> Option<u64> {
        if self.is_cancelled() {
            return None;
        }
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_none()
    }

    pub fn cancel(&mut self) {
        // Dropping the sender wakes the thread immediately.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// `mm:ss`, minutes uncapped.
pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
