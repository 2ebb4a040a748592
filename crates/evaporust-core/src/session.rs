//! The per-file upload state machine.
//!
//! ```text
//! PENDING -> EVAPORATING -> COMPLETE -> DONE
//!                 |
//!                 +--------> ERROR
//!                 +--------> ABORTED
//! ```
//!
//! [`UploadSession::start`] creates the multipart upload and spawns a driver
//! task that feeds parts to the [`PartScheduler`] and folds its events into
//! the session state one at a time. Once every part has completed the driver
//! finalizes the object. Progress is published on a `watch` channel.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evaporust_s3_model::{CompleteMultipartUploadOutput, CompletedPart};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::chunker::{PartRange, PartStatus, PartTask, plan_parts, read_part};
use crate::config::EvaporateConfig;
use crate::error::{UploadError, UploadResult};
use crate::file::UploadFile;
use crate::scheduler::{PartScheduler, PartUploader, PauseGate, SchedulerEvent};
use crate::stats::{StatsInput, UploadStats};
use crate::store::ObjectStore;

/// Lifecycle status of an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    /// Created, not started.
    #[default]
    Pending,
    /// Parts are being uploaded.
    Evaporating,
    /// The object was assembled; cleanup follows.
    Complete,
    /// Finished successfully.
    Done,
    /// Failed. The remote multipart upload is left in place.
    Error,
    /// Aborted on request.
    Aborted,
}

impl UploadStatus {
    /// Whether no further transition can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Aborted)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Evaporating => "EVAPORATING",
            Self::Complete => "COMPLETE",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// What the driver does after folding one scheduler event into the state.
#[derive(Debug)]
enum Transition {
    Ignore,
    Progress,
    Finalize,
    Fail(UploadError),
}

#[derive(Debug, Default)]
struct SessionState {
    status: UploadStatus,
    upload_id: Option<String>,
    total_size: u64,
    bytes_uploaded: u64,
    started_at: Option<DateTime<Utc>>,
    in_flight: BTreeMap<i32, PartTask>,
    /// Parts that completed or failed, with their bytes released.
    finished: BTreeMap<i32, PartTask>,
    completed: Vec<CompletedPart>,
    total_parts: usize,
    error: Option<String>,
    aborting: bool,
    finalizing: bool,
}

impl SessionState {
    fn all_parts_completed(&self) -> bool {
        self.total_parts > 0 && self.completed.len() == self.total_parts
    }

    /// Move a part out of the in-flight set with its outcome.
    fn settle(&mut self, part_number: i32, status: PartStatus, e_tag: Option<String>) {
        if let Some(mut task) = self.in_flight.remove(&part_number) {
            task.finish(status, e_tag);
            self.finished.insert(part_number, task);
        }
    }

    /// Fold one scheduler event into the state.
    ///
    /// Events are only applied while evaporating and neither aborting nor
    /// finalizing. Repeated completions of a part are ignored.
    fn apply(&mut self, event: SchedulerEvent) -> Transition {
        if self.status != UploadStatus::Evaporating || self.aborting || self.finalizing {
            return Transition::Ignore;
        }
        match event {
            SchedulerEvent::Started { part_number, .. } => {
                if let Some(task) = self.in_flight.get_mut(&part_number) {
                    task.status = PartStatus::Uploading;
                }
                Transition::Ignore
            }
            SchedulerEvent::Completed {
                part_number,
                e_tag,
                bytes,
            } => {
                if self.completed.iter().any(|p| p.part_number == part_number) {
                    self.in_flight.remove(&part_number);
                    return Transition::Ignore;
                }
                self.settle(part_number, PartStatus::Completed, Some(e_tag.clone()));
                self.completed.push(CompletedPart::new(part_number, e_tag));
                self.bytes_uploaded = (self.bytes_uploaded + bytes).min(self.total_size);
                if self.all_parts_completed() {
                    Transition::Finalize
                } else {
                    Transition::Progress
                }
            }
            SchedulerEvent::Failed {
                part_number,
                attempts,
                error,
            } => {
                self.settle(part_number, PartStatus::Failed, None);
                if attempts == 0 {
                    return Transition::Fail(error);
                }
                Transition::Fail(UploadError::PartUpload {
                    part_number,
                    attempts,
                    reason: error.to_string(),
                })
            }
            SchedulerEvent::Drained => Transition::Ignore,
        }
    }
}

struct SessionInner {
    file: Arc<dyn UploadFile>,
    file_key: String,
    bucket: String,
    part_size: u64,
    max_concurrent: usize,
    store: Mutex<Option<Arc<dyn ObjectStore>>>,
    gate: PauseGate,
    state: Mutex<SessionState>,
    stats_tx: watch::Sender<UploadStats>,
}

/// One file's multipart upload.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct UploadSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("UploadSession")
            .field("file_key", &self.inner.file_key)
            .field("bucket", &self.inner.bucket)
            .field("status", &state.status)
            .field("upload_id", &state.upload_id)
            .finish_non_exhaustive()
    }
}

impl UploadSession {
    /// Create a pending session uploading `file` to `file_key`.
    pub fn new(
        file: Arc<dyn UploadFile>,
        file_key: impl Into<String>,
        config: &EvaporateConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let state = SessionState {
            total_size: file.size(),
            ..SessionState::default()
        };
        let (stats_tx, _) = watch::channel(UploadStats::compute(&StatsInput {
            file_name: file.name(),
            file_type: file.content_type(),
            full_file_path: "",
            file_size: state.total_size,
            bytes_uploaded: 0,
            elapsed_secs: 0.0,
            status: UploadStatus::Pending,
            upload_id: None,
            error: None,
        }));

        let session = Self {
            inner: Arc::new(SessionInner {
                file,
                file_key: file_key.into(),
                bucket: config.bucket.clone(),
                part_size: config.part_size,
                max_concurrent: config.max_concurrent_parts,
                store: Mutex::new(Some(store)),
                gate: PauseGate::new(),
                state: Mutex::new(state),
                stats_tx,
            }),
        };
        session.publish();
        session
    }

    /// The object key (URL-decoded path and file name).
    #[must_use]
    pub fn file_key(&self) -> &str {
        &self.inner.file_key
    }

    /// The current lifecycle status.
    #[must_use]
    pub fn status(&self) -> UploadStatus {
        self.inner.state.lock().status
    }

    /// The remote upload id, once the multipart upload was created.
    #[must_use]
    pub fn upload_id(&self) -> Option<String> {
        self.inner.state.lock().upload_id.clone()
    }

    /// Parts uploaded so far, in completion order.
    #[must_use]
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        self.inner.state.lock().completed.clone()
    }

    /// Part numbers read but not yet reported back by the scheduler.
    #[must_use]
    pub fn in_flight_parts(&self) -> Vec<i32> {
        self.inner.state.lock().in_flight.keys().copied().collect()
    }

    /// A part's task with its current status and ETag.
    ///
    /// Finished parts are kept without their bytes. Parts still in flight
    /// when the session ends are dropped.
    #[must_use]
    pub fn part(&self, part_number: i32) -> Option<PartTask> {
        let state = self.inner.state.lock();
        state
            .in_flight
            .get(&part_number)
            .or_else(|| state.finished.get(&part_number))
            .cloned()
    }

    /// The latest stats snapshot.
    #[must_use]
    pub fn stats(&self) -> UploadStats {
        self.inner.stats_tx.borrow().clone()
    }

    /// Receive every stats snapshot published from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UploadStats> {
        self.inner.stats_tx.subscribe()
    }

    /// Wait for a terminal status and return the final snapshot.
    pub async fn wait(&self) -> UploadStats {
        let mut rx = self.inner.stats_tx.subscribe();
        let terminal = rx
            .wait_for(|stats| stats.status.is_terminal())
            .await
            .map(|stats| (*stats).clone());
        terminal.unwrap_or_else(|_| self.stats())
    }

    /// Stop dispatching new parts. Started part uploads run to completion.
    pub fn pause(&self) {
        debug!(key = %self.inner.file_key, "Pausing upload");
        self.inner.gate.pause();
    }

    /// Resume dispatching parts.
    pub fn resume(&self) {
        debug!(key = %self.inner.file_key, "Resuming upload");
        self.inner.gate.resume();
    }

    /// Whether part dispatch is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.gate.is_paused()
    }

    /// Create the multipart upload and start uploading parts.
    ///
    /// Returns the upload id once the object store accepted the upload; the
    /// parts are uploaded in the background.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidState`] if the session was already
    /// started. A file needing more parts than S3 allows fails with
    /// [`UploadError::Config`] before anything is created. Any failure of
    /// the create call (an [`UploadError::Auth`]
    /// from the signing endpoint included) moves the session to `ERROR` and
    /// is returned.
    pub async fn start(&self) -> UploadResult<String> {
        {
            let mut state = self.inner.state.lock();
            if state.status != UploadStatus::Pending {
                return Err(UploadError::InvalidState(format!(
                    "cannot start an upload in state {}",
                    state.status
                )));
            }
            state.status = UploadStatus::Evaporating;
            state.started_at = Some(Utc::now());
        }
        self.publish();

        let plan = match plan_parts(self.inner.file.size(), self.inner.part_size) {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(e)),
        };
        let store = self.store()?;
        let key = &self.inner.file_key;
        let upload_id = match store
            .create_multipart_upload(key, self.inner.file.content_type())
            .await
        {
            Ok(upload_id) if !upload_id.is_empty() => upload_id,
            Ok(_) => {
                return Err(self.fail(UploadError::InvalidResponse(
                    "object store returned an empty upload id".into(),
                )));
            }
            Err(e) => return Err(self.fail(e)),
        };

        {
            let mut state = self.inner.state.lock();
            if state.upload_id.is_none() {
                state.upload_id = Some(upload_id.clone());
            }
            state.total_parts = plan.len();
        }
        info!(key = %key, upload_id = %upload_id, parts = plan.len(), "Multipart upload created");
        self.publish();

        let uploader = Arc::new(StorePartUploader {
            store,
            key: key.clone(),
            upload_id: upload_id.clone(),
        });
        tokio::spawn(self.clone().drive(plan, uploader));
        Ok(upload_id)
    }

    /// Feed parts to the scheduler and process its events until terminal.
    async fn drive(self, plan: Vec<PartRange>, uploader: Arc<StorePartUploader>) {
        let (task_tx, task_rx) = mpsc::channel(self.inner.max_concurrent.max(1));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        PartScheduler::new(self.inner.max_concurrent, self.inner.gate.clone()).spawn(
            uploader,
            task_rx,
            event_tx.clone(),
        );
        let producer = tokio::spawn(self.clone().produce(plan, task_tx, event_tx));

        while let Some(event) = event_rx.recv().await {
            if matches!(event, SchedulerEvent::Drained) {
                break;
            }
            let transition = self.inner.state.lock().apply(event);
            match transition {
                Transition::Ignore => {}
                Transition::Progress => self.publish(),
                Transition::Finalize => {
                    self.publish();
                    // Failures are recorded on the session.
                    let _ = self.complete_upload().await;
                }
                Transition::Fail(e) => {
                    error!(key = %self.inner.file_key, error = %e, "Upload failed");
                    self.fail(e);
                }
            }
            if self.status().is_terminal() {
                break;
            }
        }
        producer.abort();
    }

    /// Read every planned part and hand it to the scheduler.
    async fn produce(
        self,
        plan: Vec<PartRange>,
        tasks: mpsc::Sender<PartTask>,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) {
        for range in plan {
            if self.inner.gate.is_closed() {
                return;
            }
            match read_part(self.inner.file.as_ref(), range).await {
                Ok(task) => {
                    self.inner
                        .state
                        .lock()
                        .in_flight
                        .insert(task.part_number, task.clone());
                    if tasks.send(task).await.is_err() {
                        return;
                    }
                }
                Err(error) => {
                    let _ = events.send(SchedulerEvent::Failed {
                        part_number: range.part_number,
                        attempts: 0,
                        error,
                    });
                    return;
                }
            }
        }
    }

    /// Assemble the uploaded parts into the final object.
    ///
    /// Called automatically once every part has completed.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidState`] if parts are still missing or
    /// the session is not uploading, and [`UploadError::Finalize`] if the
    /// object store rejects the completion (the session then moves to
    /// `ERROR`).
    pub async fn complete_upload(&self) -> UploadResult<CompleteMultipartUploadOutput> {
        let (upload_id, parts) = {
            let mut state = self.inner.state.lock();
            if state.status != UploadStatus::Evaporating || state.aborting {
                return Err(UploadError::InvalidState(format!(
                    "cannot complete an upload in state {}",
                    state.status
                )));
            }
            if state.finalizing {
                return Err(UploadError::InvalidState("upload is already finalizing".into()));
            }
            if !state.all_parts_completed() {
                return Err(UploadError::InvalidState(format!(
                    "{} of {} parts completed",
                    state.completed.len(),
                    state.total_parts
                )));
            }
            let Some(upload_id) = state.upload_id.clone() else {
                return Err(UploadError::InvalidState("upload has no upload id".into()));
            };
            state.finalizing = true;
            let mut parts = state.completed.clone();
            parts.sort_by_key(|p| p.part_number);
            (upload_id, parts)
        };

        let store = self.store()?;
        match store
            .complete_multipart_upload(&self.inner.file_key, &upload_id, &parts)
            .await
        {
            Ok(output) => {
                self.set_status(UploadStatus::Complete);
                self.publish();
                info!(
                    key = %self.inner.file_key,
                    upload_id = %upload_id,
                    parts = parts.len(),
                    "Multipart upload completed"
                );
                self.set_status(UploadStatus::Done);
                self.done();
                Ok(output)
            }
            Err(e) => {
                error!(key = %self.inner.file_key, error = %e, "Failed to complete upload");
                Err(self.fail(UploadError::Finalize(e.to_string())))
            }
        }
    }

    /// Abort the multipart upload.
    ///
    /// Stops dispatching parts and asks the object store to discard the
    /// upload. Part requests already in flight are not cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidState`] before the upload id is known,
    /// while finalizing, or once the session has finished. Returns
    /// [`UploadError::Finalize`] if the object store rejects the abort.
    pub async fn abort(&self) -> UploadResult<()> {
        let upload_id = {
            let mut state = self.inner.state.lock();
            let Some(upload_id) = state.upload_id.clone() else {
                return Err(UploadError::InvalidState(
                    "cannot abort before the upload was created".into(),
                ));
            };
            if state.finalizing || state.status.is_terminal() || state.aborting {
                return Err(UploadError::InvalidState(format!(
                    "cannot abort an upload in state {}",
                    state.status
                )));
            }
            state.aborting = true;
            upload_id
        };
        self.inner.gate.close();

        let store = self.store()?;
        match store
            .abort_multipart_upload(&self.inner.file_key, &upload_id)
            .await
        {
            Ok(()) => {
                info!(key = %self.inner.file_key, upload_id = %upload_id, "Multipart upload aborted");
                self.set_status(UploadStatus::Aborted);
                self.done();
                Ok(())
            }
            Err(e) => {
                warn!(key = %self.inner.file_key, error = %e, "Failed to abort upload");
                Err(self.fail(UploadError::Finalize(e.to_string())))
            }
        }
    }

    fn store(&self) -> UploadResult<Arc<dyn ObjectStore>> {
        self.inner
            .store
            .lock()
            .clone()
            .ok_or_else(|| UploadError::InvalidState("upload session has finished".into()))
    }

    fn set_status(&self, status: UploadStatus) {
        self.inner.state.lock().status = status;
    }

    /// Move to `ERROR`, clean up and hand the error back.
    fn fail(&self, error: UploadError) -> UploadError {
        {
            let mut state = self.inner.state.lock();
            if state.status.is_terminal() {
                return error;
            }
            state.status = UploadStatus::Error;
            state.error = Some(error.to_string());
        }
        self.done();
        error
    }

    /// Terminal cleanup: publish the final snapshot, release the store, stop
    /// dispatch and reset the counters.
    fn done(&self) {
        self.publish();
        self.inner.store.lock().take();
        self.inner.gate.close();

        let mut state = self.inner.state.lock();
        state.in_flight.clear();
        state.bytes_uploaded = 0;
        state.aborting = false;
        state.finalizing = false;
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish(&self) {
        let stats = {
            let state = self.inner.state.lock();
            let elapsed_secs = state
                .started_at
                .map_or(0.0, |at| (Utc::now() - at).num_milliseconds() as f64 / 1000.0);
            let full_file_path = format!("{}/{}", self.inner.bucket, self.inner.file_key);
            UploadStats::compute(&StatsInput {
                file_name: self.inner.file.name(),
                file_type: self.inner.file.content_type(),
                full_file_path: &full_file_path,
                file_size: state.total_size,
                bytes_uploaded: state.bytes_uploaded,
                elapsed_secs,
                status: state.status,
                upload_id: state.upload_id.as_deref(),
                error: state.error.as_deref(),
            })
        };
        self.inner.stats_tx.send_replace(stats);
    }
}

/// Uploads parts through the session's object store.
struct StorePartUploader {
    store: Arc<dyn ObjectStore>,
    key: String,
    upload_id: String,
}

#[async_trait]
impl PartUploader for StorePartUploader {
    async fn upload_part(&self, task: &PartTask) -> UploadResult<String> {
        let e_tag = self
            .store
            .upload_part(
                &self.key,
                &self.upload_id,
                task.part_number,
                task.data.clone(),
                &task.checksum.base64,
            )
            .await?;
        // Some S3-compatible stores omit the ETag header.
        Ok(e_tag.unwrap_or_else(|| task.checksum.etag()))
    }
}
