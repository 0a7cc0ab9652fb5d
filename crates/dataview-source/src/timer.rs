//! One-shot and repeating timers that report back through the data source
//! channel.

use crate::source::Message;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Debounces descriptor edits.
    Load,
    /// Reloads on an interval.
    Refresh,
    /// Paces progressive chunks.
    Progressive,
}

/// A restartable timer. Each start bumps the token, so a tick already
/// queued by an earlier run is rejected by [`Timer::accept`].
#[derive(Debug)]
pub(crate) struct Timer {
    kind: TimerKind,
    token: u64,
    repeating: bool,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    pub(crate) fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            token: 0,
            repeating: false,
            handle: None,
        }
    }

    /// Fires once after `delay`, replacing any earlier run.
    pub(crate) fn start(&mut self, delay: Duration, tx: &UnboundedSender<Message>) {
        self.stop();
        self.token += 1;
        self.repeating = false;
        let (kind, token, tx) = (self.kind, self.token, tx.clone());
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Message::TimerFired { kind, token });
        }));
    }

    /// Fires every `period`, replacing any earlier run.
    pub(crate) fn start_repeating(&mut self, period: Duration, tx: &UnboundedSender<Message>) {
        self.stop();
        self.token += 1;
        self.repeating = true;
        let (kind, token, tx) = (self.kind, self.token, tx.clone());
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(Message::TimerFired { kind, token }).is_err() {
                    break;
                }
            }
        }));
    }

    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Checks a tick against the current run. A one-shot timer disarms
    /// when its tick is accepted.
    pub(crate) fn accept(&mut self, token: u64) -> bool {
        if token != self.token || self.handle.is_none() {
            return false;
        }
        if !self.repeating {
            self.handle = None;
        }
        true
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
