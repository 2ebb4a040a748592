//! Bounded-concurrency, pausable part dispatch with retry.
//!
//! The scheduler pulls [`PartTask`]s from a channel and runs at most
//! `max_concurrent` uploads at once. Before each dispatch it consults the
//! [`PauseGate`]: a paused gate holds queued parts back while started uploads
//! keep running, and a closed gate stops dispatch for good. Each part gets up
//! to [`MAX_PART_ATTEMPTS`] attempts with no backoff. Attempts and outcomes
//! are reported as [`SchedulerEvent`]s, ending with [`SchedulerEvent::Drained`]
//! once the task channel is closed and every started part has finished.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::chunker::PartTask;
use crate::error::{UploadError, UploadResult};

/// Attempts per part before the failure is reported.
pub const MAX_PART_ATTEMPTS: u32 = 3;

/// Dispatch state of a [`PauseGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Parts are dispatched.
    Open,
    /// Queued parts wait; started uploads continue.
    Paused,
    /// Dispatch has stopped permanently.
    Closed,
}

/// Gate queried by the scheduler before every dispatch.
#[derive(Debug, Clone)]
pub struct PauseGate {
    state: Arc<watch::Sender<GateState>>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    /// An open gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(watch::Sender::new(GateState::Open)),
        }
    }

    /// Hold back new dispatches. No effect on a closed gate.
    pub fn pause(&self) {
        self.state.send_if_modified(|state| {
            if *state == GateState::Open {
                *state = GateState::Paused;
                true
            } else {
                false
            }
        });
    }

    /// Allow dispatch again. No effect on a closed gate.
    pub fn resume(&self) {
        self.state.send_if_modified(|state| {
            if *state == GateState::Paused {
                *state = GateState::Open;
                true
            } else {
                false
            }
        });
    }

    /// Stop dispatch permanently.
    pub fn close(&self) {
        self.state.send_replace(GateState::Closed);
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    /// Whether dispatch is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == GateState::Paused
    }

    /// Whether dispatch has stopped for good.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == GateState::Closed
    }

    /// Wait until the gate is not paused. Returns `false` if it is closed.
    pub async fn wait_open(&self) -> bool {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| *state != GateState::Paused).await {
            Ok(state) => *state == GateState::Open,
            Err(_) => false,
        }
    }
}

/// Uploads one part and returns its ETag.
#[async_trait]
pub trait PartUploader: Send + Sync {
    /// Upload `task` once. Retries are the scheduler's business.
    async fn upload_part(&self, task: &PartTask) -> UploadResult<String>;
}

/// Outcome of part dispatch.
#[derive(Debug)]
pub enum SchedulerEvent {
    /// An upload attempt for a part began.
    Started {
        /// Part being uploaded.
        part_number: i32,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// A part was uploaded.
    Completed {
        /// Uploaded part.
        part_number: i32,
        /// ETag to send when completing the upload.
        e_tag: String,
        /// Size of the part.
        bytes: u64,
    },
    /// A part failed on every attempt (or dispatch stopped mid-retry).
    Failed {
        /// Failed part.
        part_number: i32,
        /// Attempts made; zero when the part could not even be read.
        attempts: u32,
        /// Error of the last attempt.
        error: UploadError,
    },
    /// The task channel is closed and every started part has finished.
    Drained,
}

/// Dispatches part uploads with bounded concurrency.
#[derive(Debug, Clone)]
pub struct PartScheduler {
    max_concurrent: usize,
    gate: PauseGate,
}

impl PartScheduler {
    /// A scheduler running at most `max_concurrent` uploads (at least one),
    /// dispatching through `gate`.
    #[must_use]
    pub fn new(max_concurrent: usize, gate: PauseGate) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            gate,
        }
    }

    /// The gate consulted before each dispatch.
    #[must_use]
    pub fn gate(&self) -> &PauseGate {
        &self.gate
    }

    /// Run the scheduler on its own task.
    pub fn spawn(
        self,
        uploader: Arc<dyn PartUploader>,
        tasks: mpsc::Receiver<PartTask>,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(uploader, tasks, events))
    }

    /// Dispatch every task received on `tasks`, then report `Drained`.
    pub async fn run(
        self,
        uploader: Arc<dyn PartUploader>,
        mut tasks: mpsc::Receiver<PartTask>,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut in_flight = JoinSet::new();

        while let Some(task) = tasks.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            // Checked after the permit so a pause issued while waiting for a
            // free slot still holds this part back.
            if !self.gate.wait_open().await {
                debug!(part_number = task.part_number, "Gate closed, stopping dispatch");
                break;
            }

            let uploader = Arc::clone(&uploader);
            let events = events.clone();
            let gate = self.gate.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                let event = upload_with_retry(uploader.as_ref(), &task, &gate, &events).await;
                let _ = events.send(event);
            });

            // Reap finished uploads so the set does not grow with the file.
            while in_flight.try_join_next().is_some() {}
        }

        // Stop accepting tasks so a blocked producer observes the closed channel.
        tasks.close();
        while in_flight.join_next().await.is_some() {}
        let _ = events.send(SchedulerEvent::Drained);
    }
}

async fn upload_with_retry(
    uploader: &dyn PartUploader,
    task: &PartTask,
    gate: &PauseGate,
    events: &mpsc::UnboundedSender<SchedulerEvent>,
) -> SchedulerEvent {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let _ = events.send(SchedulerEvent::Started {
            part_number: task.part_number,
            attempt,
        });
        match uploader.upload_part(task).await {
            Ok(e_tag) => {
                debug!(part_number = task.part_number, attempt, "Part uploaded");
                return SchedulerEvent::Completed {
                    part_number: task.part_number,
                    e_tag,
                    bytes: task.len(),
                };
            }
            Err(error) if attempt >= MAX_PART_ATTEMPTS || gate.is_closed() => {
                warn!(part_number = task.part_number, attempt, error = %error, "Part failed, giving up");
                return SchedulerEvent::Failed {
                    part_number: task.part_number,
                    attempts: attempt,
                    error,
                };
            }
            Err(error) => {
                warn!(part_number = task.part_number, attempt, error = %error, "Part failed, retrying");
            }
        }
    }
}
