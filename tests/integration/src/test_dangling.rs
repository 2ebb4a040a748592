//! Abort and dangling upload integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use evaporust_core::{MemoryFile, UploadFile, UploadStatus};

    use crate::{cleanup_bucket, create_test_bucket, local_coordinator, s3_client, test_data};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_list_and_abort_dangling_uploads() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "evap-dangling").await;
        let coordinator = local_coordinator(&bucket);

        let created = client
            .create_multipart_upload()
            .bucket(&bucket)
            .key("left/behind.bin")
            .send()
            .await
            .expect("create_multipart_upload");
        let upload_id = created.upload_id().expect("upload_id").to_owned();

        let dangling = coordinator
            .list_dangling_uploads()
            .await
            .expect("list dangling uploads");
        let upload = dangling
            .iter()
            .find(|u| u.upload_id == upload_id)
            .expect("dangling upload listed");
        assert_eq!(upload.key, "left/behind.bin");

        coordinator.abort_dangling(upload).await.expect("abort dangling");
        let remaining = coordinator
            .list_dangling_uploads()
            .await
            .expect("list dangling uploads");
        assert!(remaining.iter().all(|u| u.upload_id != upload_id));

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_abort_paused_upload() {
        let client = s3_client();
        let bucket = create_test_bucket(&client, "evap-abort").await;
        let coordinator = local_coordinator(&bucket);

        let file: Arc<dyn UploadFile> = Arc::new(MemoryFile::new(
            "aborted.bin",
            "application/octet-stream",
            test_data(16 * 1024 * 1024),
        ));
        let id = coordinator.add(file, None).await.expect("add upload");
        coordinator.pause(&id).expect("pause");
        coordinator.abort(&id).await.expect("abort");

        let session = coordinator.session(&id).expect("session");
        assert_eq!(session.status(), UploadStatus::Aborted);

        let result = client
            .head_object()
            .bucket(&bucket)
            .key("aborted.bin")
            .send()
            .await;
        assert!(result.is_err(), "aborted object must not exist");

        cleanup_bucket(&client, &bucket).await;
    }
}
