//! Multipart upload integration tests.

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use evaporust_core::{LocalFile, MemoryFile, UploadFile, UploadStatus};

    use crate::{
        cleanup_bucket, create_test_bucket, local_coordinator, remote_coordinator, s3_client,
        test_data,
    };

    const MIB: usize = 1024 * 1024;

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_upload_file_in_parts_and_read_it_back() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "evap").await;
        let coordinator = local_coordinator(&bucket);

        let data = test_data(12 * MIB);
        let file: Arc<dyn UploadFile> =
            Arc::new(MemoryFile::new("big file.bin", "application/octet-stream", data.clone()));
        let id = coordinator.add(file, None).await.expect("add upload");

        let stats = coordinator.session(&id).expect("session").wait().await;
        assert_eq!(stats.status, UploadStatus::Done, "error: {:?}", stats.error);
        assert_eq!(stats.total_uploaded, data.len() as u64);

        let object = client
            .get_object()
            .bucket(&bucket)
            .key("big file.bin")
            .send()
            .await
            .expect("get_object");
        let body = object.body.collect().await.expect("read body").into_bytes();
        assert_eq!(body.len(), data.len());
        assert!(body[..] == data[..]);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_upload_local_file_under_prefix() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "evap-local").await;
        let coordinator = local_coordinator(&bucket);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        std::fs::File::create(&path)
            .and_then(|mut f| f.write_all(&test_data(6 * MIB)))
            .expect("write temp file");
        let file = LocalFile::open(&path).await.expect("open file");

        let id = coordinator
            .add(Arc::new(file), Some("/reports/2024/"))
            .await
            .expect("add upload");
        let stats = coordinator.session(&id).expect("session").wait().await;
        assert_eq!(stats.status, UploadStatus::Done, "error: {:?}", stats.error);

        let head = client
            .head_object()
            .bucket(&bucket)
            .key("reports/2024/report.json")
            .send()
            .await
            .expect("head_object");
        assert_eq!(head.content_length(), Some(6 * MIB as i64));
        assert_eq!(head.content_type(), Some("application/json"));

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server and signing server"]
    async fn test_should_upload_with_remote_signatures() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "evap-remote").await;
        let coordinator = remote_coordinator(&bucket);

        let file: Arc<dyn UploadFile> =
            Arc::new(MemoryFile::new("remote.bin", "application/octet-stream", test_data(MIB)));
        let id = coordinator.add(file, Some("signed")).await.expect("add upload");

        let stats = coordinator.session(&id).expect("session").wait().await;
        assert_eq!(stats.status, UploadStatus::Done, "error: {:?}", stats.error);
        client
            .head_object()
            .bucket(&bucket)
            .key("signed/remote.bin")
            .send()
            .await
            .expect("head_object");

        cleanup_bucket(&client, &bucket).await;
    }
}
