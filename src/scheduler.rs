//! Recurring jittered timer that drives the outbox send cycle.

use crate::worker::Command;
use rand::Rng;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

/// Arms a background task that submits a send-cycle command on a jittered
/// interval. Arming is idempotent through [`CycleTimer::arm_if_disarmed`];
/// the jitter (±10% per tick) keeps retry bursts from lining up across
/// installs.
///
/// The timer holds only a weak handle to the worker queue, so an armed
/// timer never keeps a shut-down worker alive; the tick task stops itself
/// once the queue is gone.
pub struct CycleTimer {
    commands: WeakUnboundedSender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CycleTimer {
    pub(crate) fn new(commands: WeakUnboundedSender<Command>) -> Self {
        Self {
            commands,
            task: Mutex::new(None),
        }
    }

    /// Start (or restart) the recurring tick task.
    pub fn arm(&self, interval: Duration) {
        let commands = self.commands.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(jittered(interval)).await;
                let Some(sender) = commands.upgrade() else {
                    break;
                };
                if sender.send(Command::RunSendCycle).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.task_slot().replace(handle) {
            previous.abort();
        }
        debug!(interval_secs = interval.as_secs(), "send cycle timer armed");
    }

    /// Stop the tick task, if any.
    pub fn disarm(&self) {
        if let Some(task) = self.task_slot().take() {
            task.abort();
            debug!("send cycle timer disarmed");
        }
    }

    /// Whether a tick task is currently running.
    pub fn is_armed(&self) -> bool {
        let mut slot = self.task_slot();
        match slot.as_ref() {
            Some(task) if !task.is_finished() => true,
            Some(_) => {
                *slot = None;
                false
            }
            None => false,
        }
    }

    /// Arm unless already armed; returns whether a new task was started.
    pub fn arm_if_disarmed(&self, interval: Duration) -> bool {
        if self.is_armed() {
            return false;
        }
        self.arm(interval);
        true
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for CycleTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn jittered(interval: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    interval.mul_f64(factor)
}
