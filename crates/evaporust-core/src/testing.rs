//! In-memory [`ObjectStore`] double for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use evaporust_s3_model::{
    CompleteMultipartUploadOutput, CompletedPart, ListMultipartUploadsOutput, MultipartUpload,
};
use parking_lot::Mutex;

use crate::error::{UploadError, UploadResult};
use crate::store::ObjectStore;

#[derive(Debug, Default)]
struct Recorded {
    creates: Vec<(String, String)>,
    parts: HashMap<i32, u32>,
    completes: Vec<Vec<i32>>,
    aborts: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub(crate) struct MockStore {
    recorded: Mutex<Recorded>,
    /// Part number to number of leading attempts that fail.
    part_failures: Mutex<HashMap<i32, u32>>,
    /// Per-part upload delay, to shuffle completion order.
    part_delays: Mutex<HashMap<i32, Duration>>,
    delay: Duration,
    create_error: Mutex<Option<fn() -> UploadError>>,
    complete_error: Mutex<Option<fn() -> UploadError>>,
    omit_etag: bool,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    pub(crate) dangling: Vec<MultipartUpload>,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn without_etag(mut self) -> Self {
        self.omit_etag = true;
        self
    }

    pub(crate) fn fail_part(self, part_number: i32, attempts: u32) -> Self {
        self.part_failures.lock().insert(part_number, attempts);
        self
    }

    pub(crate) fn delay_part(self, part_number: i32, delay: Duration) -> Self {
        self.part_delays.lock().insert(part_number, delay);
        self
    }

    pub(crate) fn fail_create(self, error: fn() -> UploadError) -> Self {
        *self.create_error.lock() = Some(error);
        self
    }

    pub(crate) fn fail_complete(self, error: fn() -> UploadError) -> Self {
        *self.complete_error.lock() = Some(error);
        self
    }

    pub(crate) fn creates(&self) -> usize {
        self.recorded.lock().creates.len()
    }

    pub(crate) fn content_types(&self) -> Vec<String> {
        self.recorded.lock().creates.iter().map(|(_, ct)| ct.clone()).collect()
    }

    pub(crate) fn completes(&self) -> Vec<Vec<i32>> {
        self.recorded.lock().completes.clone()
    }

    pub(crate) fn aborts(&self) -> Vec<(String, String)> {
        self.recorded.lock().aborts.clone()
    }

    pub(crate) fn attempts(&self, part_number: i32) -> u32 {
        self.recorded.lock().parts.get(&part_number).copied().unwrap_or(0)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> UploadResult<String> {
        if let Some(error) = *self.create_error.lock() {
            return Err(error());
        }
        let mut recorded = self.recorded.lock();
        recorded.creates.push((key.to_owned(), content_type.to_owned()));
        Ok(format!("upload-{}", recorded.creates.len()))
    }

    async fn upload_part(
        &self,
        _key: &str,
        _upload_id: &str,
        part_number: i32,
        body: Bytes,
        _content_md5: &str,
    ) -> UploadResult<Option<String>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .part_delays
            .lock()
            .get(&part_number)
            .copied()
            .unwrap_or(self.delay);
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let attempt = {
            let mut recorded = self.recorded.lock();
            let entry = recorded.parts.entry(part_number).or_default();
            *entry += 1;
            *entry
        };
        let failures = self.part_failures.lock().get(&part_number).copied().unwrap_or(0);
        if attempt <= failures {
            return Err(UploadError::ObjectStore {
                status: 500,
                code: "InternalError".into(),
                message: None,
            });
        }
        if self.omit_etag {
            return Ok(None);
        }
        Ok(Some(format!("\"etag-{part_number}-{}\"", body.len())))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        _upload_id: &str,
        parts: &[CompletedPart],
    ) -> UploadResult<CompleteMultipartUploadOutput> {
        self.recorded
            .lock()
            .completes
            .push(parts.iter().map(|p| p.part_number).collect());
        if let Some(error) = *self.complete_error.lock() {
            return Err(error());
        }
        Ok(CompleteMultipartUploadOutput {
            key: Some(key.to_owned()),
            e_tag: Some(format!("\"final-{}\"", parts.len())),
            ..CompleteMultipartUploadOutput::default()
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> UploadResult<()> {
        self.recorded
            .lock()
            .aborts
            .push((key.to_owned(), upload_id.to_owned()));
        Ok(())
    }

    async fn list_multipart_uploads(
        &self,
        _key_marker: Option<&str>,
        _upload_id_marker: Option<&str>,
    ) -> UploadResult<ListMultipartUploadsOutput> {
        Ok(ListMultipartUploadsOutput {
            uploads: self.dangling.clone(),
            ..ListMultipartUploadsOutput::default()
        })
    }
}
