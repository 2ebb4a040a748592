//! Registry of upload sessions.
//!
//! [`UploadCoordinator`] starts one [`UploadSession`] per file, addresses
//! sessions by upload id, and merges every session's stats into a single
//! list published on a `watch` channel. Finished sessions stay registered,
//! with their final stats, until [`UploadCoordinator::remove`] or
//! [`UploadCoordinator::remove_finished`] evicts them.

use std::sync::Arc;

use dashmap::DashMap;
use evaporust_s3_model::MultipartUpload;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::EvaporateConfig;
use crate::error::{UploadError, UploadResult};
use crate::file::UploadFile;
use crate::session::{UploadSession, UploadStatus};
use crate::stats::UploadStats;
use crate::store::{ObjectStore, S3ObjectStore, list_all_multipart_uploads};
use crate::utils::{encode_object_name, object_key};

/// Starts and tracks multipart uploads to one bucket.
#[derive(Debug)]
pub struct UploadCoordinator {
    config: EvaporateConfig,
    store: Arc<dyn ObjectStore>,
    sessions: DashMap<String, UploadSession>,
    forwarders: DashMap<String, JoinHandle<()>>,
    stats: Arc<DashMap<String, UploadStats>>,
    stats_tx: Arc<watch::Sender<Vec<UploadStats>>>,
}

impl UploadCoordinator {
    /// Validate `config` and connect to its S3 endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Config`] if the configuration is invalid.
    pub fn new(config: EvaporateConfig) -> UploadResult<Self> {
        let config = config.validate()?;
        let store = S3ObjectStore::from_config(&config)?;
        info!(bucket = %config.bucket, region = %config.region, "Upload coordinator ready");
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Use an existing object store. `config` is taken as is.
    #[must_use]
    pub fn with_store(config: EvaporateConfig, store: Arc<dyn ObjectStore>) -> Self {
        let (stats_tx, _) = watch::channel(Vec::new());
        Self {
            config,
            store,
            sessions: DashMap::new(),
            forwarders: DashMap::new(),
            stats: Arc::new(DashMap::new()),
            stats_tx: Arc::new(stats_tx),
        }
    }

    /// The configuration every session is created with.
    #[must_use]
    pub fn config(&self) -> &EvaporateConfig {
        &self.config
    }

    /// Upload `file` under the optional key prefix `path`.
    ///
    /// Returns the upload id once the multipart upload was created; parts are
    /// uploaded in the background.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidFile`] for an unnamed file or an invalid
    /// prefix, and the session's error if the upload cannot be created.
    pub async fn add(&self, file: Arc<dyn UploadFile>, path: Option<&str>) -> UploadResult<String> {
        if file.name().is_empty() {
            return Err(UploadError::InvalidFile("the file must have a name".into()));
        }
        let key = object_key(path, &encode_object_name(file.name()))?;
        debug!(key = %key, size = file.size(), "Adding upload");

        let session = UploadSession::new(file, key, &self.config, Arc::clone(&self.store));
        let upload_id = session.start().await?;

        self.sessions.insert(upload_id.clone(), session.clone());
        let forwarder = self.forward_stats(upload_id.clone(), &session);
        self.forwarders.insert(upload_id.clone(), forwarder);
        Ok(upload_id)
    }

    /// Merge the session's stats into the aggregate until it finishes.
    fn forward_stats(&self, upload_id: String, session: &UploadSession) -> JoinHandle<()> {
        let mut rx = session.subscribe();
        let stats = Arc::clone(&self.stats);
        let stats_tx = Arc::clone(&self.stats_tx);
        tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                let terminal = snapshot.status.is_terminal();
                stats.insert(upload_id.clone(), snapshot);
                stats_tx.send_replace(collect_stats(&stats));
                if terminal || rx.changed().await.is_err() {
                    return;
                }
            }
        })
    }

    /// The session registered under `upload_id`.
    #[must_use]
    pub fn session(&self, upload_id: &str) -> Option<UploadSession> {
        self.sessions.get(upload_id).map(|s| s.value().clone())
    }

    /// Stop dispatching new parts of an upload.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::NotFound`] for an unknown upload id and
    /// [`UploadError::InvalidState`] for a finished one.
    pub fn pause(&self, upload_id: &str) -> UploadResult<()> {
        self.require_active(upload_id)?.pause();
        Ok(())
    }

    /// Resume a paused upload.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::NotFound`] for an unknown upload id and
    /// [`UploadError::InvalidState`] for a finished one.
    pub fn resume(&self, upload_id: &str) -> UploadResult<()> {
        self.require_active(upload_id)?.resume();
        Ok(())
    }

    /// Evict a finished upload and its stats from the registry.
    ///
    /// The multipart upload of a failed session is left in the bucket; it
    /// still shows up in [`Self::list_dangling_uploads`].
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::NotFound`] for an unknown upload id and
    /// [`UploadError::InvalidState`] while the upload is still running.
    pub async fn remove(&self, upload_id: &str) -> UploadResult<UploadSession> {
        let session = self.require(upload_id)?;
        let status = session.status();
        if !status.is_terminal() {
            return Err(UploadError::InvalidState(format!(
                "cannot remove upload {upload_id} in state {status}"
            )));
        }

        self.sessions.remove(upload_id);
        // The forwarder may still owe the final snapshot; let it land first.
        if let Some((_, forwarder)) = self.forwarders.remove(upload_id) {
            let _ = forwarder.await;
        }
        self.stats.remove(upload_id);
        self.stats_tx.send_replace(collect_stats(&self.stats));
        debug!(upload_id, %status, "Upload removed");
        Ok(session)
    }

    /// Evict every finished upload. Returns how many were removed.
    pub async fn remove_finished(&self) -> usize {
        let finished: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().status().is_terminal())
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for upload_id in finished {
            if self.remove(&upload_id).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Finished uploads removed");
        }
        removed
    }

    /// Abort an upload.
    ///
    /// A session that already failed has released its store; its leftover
    /// multipart upload is aborted through the coordinator's store instead.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::NotFound`] for an unknown upload id, or the
    /// session's abort error.
    pub async fn abort(&self, upload_id: &str) -> UploadResult<()> {
        let session = self.require(upload_id)?;
        if session.status() == UploadStatus::Error {
            let upload = MultipartUpload {
                key: session.file_key().to_owned(),
                upload_id: upload_id.to_owned(),
                ..MultipartUpload::default()
            };
            return self.abort_dangling(&upload).await;
        }
        session.abort().await
    }

    /// In-progress multipart uploads in the bucket, across every page.
    ///
    /// # Errors
    ///
    /// Propagates the object store's error.
    pub async fn list_dangling_uploads(&self) -> UploadResult<Vec<MultipartUpload>> {
        list_all_multipart_uploads(self.store.as_ref()).await
    }

    /// Abort a multipart upload returned by [`Self::list_dangling_uploads`].
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Finalize`] if the object store rejects the abort.
    pub async fn abort_dangling(&self, upload: &MultipartUpload) -> UploadResult<()> {
        self.store
            .abort_multipart_upload(&upload.key, &upload.upload_id)
            .await
            .map_err(|e| UploadError::Finalize(e.to_string()))?;
        info!(key = %upload.key, upload_id = %upload.upload_id, "Dangling upload aborted");
        Ok(())
    }

    /// Receive the aggregated stats list on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadStats>> {
        self.stats_tx.subscribe()
    }

    /// The current aggregated stats, ordered by upload id.
    #[must_use]
    pub fn stats(&self) -> Vec<UploadStats> {
        collect_stats(&self.stats)
    }

    fn require(&self, upload_id: &str) -> UploadResult<UploadSession> {
        self.session(upload_id)
            .ok_or_else(|| UploadError::NotFound(upload_id.to_owned()))
    }

    fn require_active(&self, upload_id: &str) -> UploadResult<UploadSession> {
        let session = self.require(upload_id)?;
        let status = session.status();
        if status.is_terminal() {
            return Err(UploadError::InvalidState(format!(
                "upload {upload_id} has finished with status {status}"
            )));
        }
        Ok(session)
    }
}

fn collect_stats(stats: &DashMap<String, UploadStats>) -> Vec<UploadStats> {
    let mut entries: Vec<(String, UploadStats)> = stats
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, stats)| stats).collect()
}
