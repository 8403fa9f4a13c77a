//! Named, cancellable timers
//!
//! All periodic and delayed work in the dialer goes through a [`Scheduler`] so
//! it can be stopped as a unit on deactivation. Scheduling under a name that is
//! already in use replaces the earlier task. Cancelling never interrupts a task
//! body that is already running; the task stops at its next wait.
//!
//! Timers run on `tokio::time`, so tests drive them with a paused clock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::trace;

struct ScheduledTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns a set of named timer tasks
#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Arc<Mutex<HashMap<String, ScheduledTask>>>,
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped with the scheduler
            return;
        }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` every `period`, first run one period from now.
    pub fn every<F, Fut>(&self, name: &str, period: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, mut rx) = watch::channel(false);
        let label = name.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled(&mut rx) => break,
                    _ = ticker.tick() => {}
                }
                trace!(task = %label, "periodic tick");
                task().await;
            }
        });
        self.insert(name, ScheduledTask { cancel, handle });
    }

    /// Run `task` once after `delay`.
    pub fn after<F, Fut>(&self, name: &str, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, mut rx) = watch::channel(false);
        let label = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled(&mut rx) => return,
                _ = sleep(delay) => {}
            }
            trace!(task = %label, "delayed task firing");
            task().await;
        });
        self.insert(name, ScheduledTask { cancel, handle });
    }

    /// Run `task` `delay` after scheduling, then again `delay` after each run
    /// completes.
    pub fn repeat_after<F, Fut>(&self, name: &str, delay: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, mut rx) = watch::channel(false);
        let label = name.to_string();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled(&mut rx) => break,
                    _ = sleep(delay) => {}
                }
                trace!(task = %label, "rescheduling task firing");
                task().await;
            }
        });
        self.insert(name, ScheduledTask { cancel, handle });
    }

    fn insert(&self, name: &str, task: ScheduledTask) {
        if let Some(previous) = self.tasks.lock().insert(name.to_string(), task) {
            let _ = previous.cancel.send(true);
        }
    }

    /// Cancel one task. Returns whether a task was registered under `name`.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock().remove(name) {
            Some(task) => {
                let _ = task.cancel.send(true);
                true
            }
            None => false,
        }
    }

    /// Cancel every task
    pub fn cancel_all(&self) {
        let drained: Vec<(String, ScheduledTask)> = self.tasks.lock().drain().collect();
        for (name, task) in drained {
            trace!(task = %name, "cancelled");
            let _ = task.cancel.send(true);
        }
    }

    /// Whether a live task is registered under `name`
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .get(name)
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|task| !task.handle.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
