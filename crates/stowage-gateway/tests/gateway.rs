mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use helpers::*;
use stowage_core::models::{UploadOptions, UploadRequest, CANCELLED_MESSAGE};
use stowage_core::{Credentials, Provider, StorageBackend};
use stowage_gateway::{CancellationToken, GatewayState, StorageGateway, StorageGatewayContext};
use stowage_storage::{LocalStorage, ProviderClientFactory, Storage};
use uuid::Uuid;

fn pdf() -> UploadRequest {
    UploadRequest::new(
        b"%PDF-1.7 quarterly numbers".to_vec(),
        "Q3 Report.pdf",
        Some("application/pdf".to_string()),
        Some("reports".to_string()),
    )
}

#[tokio::test]
async fn test_upload_goes_to_primary_when_ready() {
    let h = harness(MemoryStorage::primary());
    let cancel = CancellationToken::new();

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.provider, Some(Provider::Primary));
    let path = result.path.clone().unwrap();
    assert!(path.starts_with("reports/"));
    assert!(path.ends_with("-q3_report.pdf"));
    assert_eq!(
        result.url.as_deref(),
        Some(format!("{}/{}/{}", PRIMARY_ENDPOINT, BUCKET, path).as_str())
    );
    assert_eq!(result.size, Some(26));
    assert!(h.primary.contains(&path));
    assert_eq!(h.secondary.len(), 0);

    h.gateway.drain_metadata().await;
    let records = h.recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider, Provider::Primary);
    assert_eq!(records[0].storage_path, path);
    assert_eq!(records[0].title, "Q3 Report.pdf");
    assert_eq!(records[0].metadata["provider"], "primary");
    assert_eq!(records[0].metadata["contentSha256"].len(), 64);
    assert_eq!(h.gateway.stats().metadata_writes, 1);
}

#[tokio::test]
async fn test_primary_failure_falls_back_to_secondary() {
    let h = harness(MemoryStorage::primary().failing_puts());
    let cancel = CancellationToken::new();

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;

    assert!(result.success);
    assert_eq!(result.provider, Some(Provider::Secondary));
    let path = result.path.clone().unwrap();
    assert_eq!(
        result.url.as_deref(),
        Some(format!("{}/{}", SECONDARY_BASE, path).as_str())
    );
    assert!(h.secondary.contains(&path));
    assert_eq!(h.primary.put_calls.load(Ordering::SeqCst), 1);

    h.gateway.drain_metadata().await;
    let records = h.recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider, Provider::Secondary);

    let stats = h.gateway.stats();
    assert_eq!(stats.primary_failures, 1);
    assert_eq!(stats.consecutive_primary_failures, 1);
    assert_eq!(stats.fallback_uploads, 1);
    assert_eq!(stats.failed_uploads, 0);
}

#[tokio::test]
async fn test_primary_is_retried_on_every_call() {
    let h = harness(MemoryStorage::primary().failing_puts());
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;
        assert_eq!(result.provider, Some(Provider::Secondary));
    }
    assert_eq!(h.primary.put_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.gateway.stats().consecutive_primary_failures, 3);

    h.primary.fail_puts.store(false, Ordering::SeqCst);
    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;
    assert_eq!(result.provider, Some(Provider::Primary));
    assert_eq!(h.gateway.stats().consecutive_primary_failures, 0);
    assert_eq!(h.gateway.stats().primary_failures, 3);
}

#[tokio::test]
async fn test_both_providers_failing_reports_error_without_record() {
    let h = harness_with(
        configured_credentials(),
        MemoryStorage::primary().failing_puts(),
        MemoryStorage::secondary().failing_puts(),
        RecordingRecorder::default(),
    );
    let cancel = CancellationToken::new();

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;

    assert!(!result.success);
    assert!(result.error.is_some());
    assert!(result.provider.is_none());
    assert!(result.url.is_none());

    h.gateway.drain_metadata().await;
    assert!(h.recorder.records().is_empty());
    assert_eq!(h.gateway.stats().failed_uploads, 1);
}

#[tokio::test]
async fn test_empty_file_is_rejected_without_network() {
    let h = harness(MemoryStorage::primary());
    let cancel = CancellationToken::new();
    let empty = UploadRequest::new(Bytes::new(), "empty.txt", None, None);

    let result = h.gateway.upload(empty, UploadOptions::default(), &cancel).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("File is empty"));
    assert_eq!(h.gateway.state(), GatewayState::NotInitialized);
    assert_eq!(h.primary.authorize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.primary.put_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.secondary.put_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_initialize_authorizes_once() {
    let h = harness(MemoryStorage::primary().with_authorize_delay(Duration::from_millis(50)));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let gateway = Arc::clone(&h.gateway);
        handles.push(tokio::spawn(async move { gateway.initialize().await }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(h.primary.authorize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.builds.load(Ordering::SeqCst), 1);
    assert_eq!(h.gateway.state(), GatewayState::Ready);
}

#[tokio::test]
async fn test_concurrent_first_uploads_share_initialization() {
    let h = harness(MemoryStorage::primary().with_authorize_delay(Duration::from_millis(20)));

    let mut handles = Vec::new();
    for i in 0..8 {
        let gateway = Arc::clone(&h.gateway);
        handles.push(tokio::spawn(async move {
            let request = UploadRequest::new(vec![i as u8 + 1], format!("{}.bin", i), None, None);
            gateway
                .upload(request, UploadOptions::default(), &CancellationToken::new())
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.provider, Some(Provider::Primary));
    }
    assert_eq!(h.primary.authorize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.primary.len(), 8);
}

#[tokio::test]
async fn test_unconfigured_primary_uses_secondary() {
    let h = unconfigured_harness();
    let cancel = CancellationToken::new();

    assert!(!h.gateway.initialize().await);
    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;

    assert!(result.success);
    assert_eq!(result.provider, Some(Provider::Secondary));
    assert_eq!(h.builds.load(Ordering::SeqCst), 0);
    assert_eq!(h.primary.authorize_calls.load(Ordering::SeqCst), 0);

    let status = h.gateway.provider_status();
    assert!(!status.primary_configured);
    assert!(!status.primary_ready);
    assert!(status.secondary_available);
    assert_eq!(status.secondary_backend, StorageBackend::Managed);
    assert_eq!(status.preferred, Some(Provider::Secondary));
}

#[tokio::test]
async fn test_failed_authorization_is_sticky() {
    let h = harness(MemoryStorage::primary().failing_authorize());
    let cancel = CancellationToken::new();

    assert_eq!(h.gateway.provider_status().preferred, None);
    assert!(!h.gateway.initialize().await);

    h.primary.fail_authorize.store(false, Ordering::SeqCst);
    assert!(!h.gateway.initialize().await);

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;
    assert_eq!(result.provider, Some(Provider::Secondary));
    assert_eq!(h.primary.authorize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.primary.put_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.gateway.stats().primary_failures, 0);

    let status = h.gateway.provider_status();
    assert!(status.primary_configured);
    assert!(!status.primary_ready);
}

#[tokio::test]
async fn test_delete_never_uploaded_path_is_false() {
    let h = harness(MemoryStorage::primary());
    let cancel = CancellationToken::new();

    assert!(!h.gateway.delete("reports/never-uploaded.pdf", &cancel).await);
    assert!(!h.gateway.delete("", &cancel).await);
    assert!(!h.gateway.delete("../etc/passwd", &cancel).await);

    h.gateway.drain_metadata().await;
    assert!(h.recorder.forgotten.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_removes_object_and_record() {
    let h = harness(MemoryStorage::primary().failing_puts());
    let cancel = CancellationToken::new();

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;
    let path = result.path.unwrap();
    h.gateway.drain_metadata().await;

    assert!(h.gateway.exists(&path, &cancel).await);
    assert!(h.gateway.delete(&path, &cancel).await);
    assert!(!h.secondary.contains(&path));
    assert!(!h.gateway.exists(&path, &cancel).await);

    h.gateway.drain_metadata().await;
    assert_eq!(h.recorder.forgotten.lock().unwrap().as_slice(), &[path.clone()]);
    assert!(h.recorder.records().is_empty());

    assert!(!h.gateway.delete(&path, &cancel).await);
}

#[tokio::test]
async fn test_delete_reaches_objects_on_the_other_provider() {
    let h = harness(MemoryStorage::primary());
    let cancel = CancellationToken::new();
    h.secondary.insert("reports/old.pdf", b"legacy");

    assert!(h.gateway.delete("reports/old.pdf", &cancel).await);
    assert!(!h.secondary.contains("reports/old.pdf"));
}

#[tokio::test]
async fn test_signed_url_for_missing_object() {
    let h = harness(MemoryStorage::primary());

    let url = h
        .gateway
        .get_signed_url("reports/missing.pdf", Some(Duration::from_secs(600)))
        .await
        .unwrap();

    assert!(url.starts_with(&format!("{}/{}/reports/missing.pdf?", PRIMARY_ENDPOINT, BUCKET)));
    assert!(url.contains("X-Amz-Expires=600"));
}

#[tokio::test]
async fn test_signed_url_requires_configured_primary() {
    let h = unconfigured_harness();
    assert!(h.gateway.get_signed_url("reports/a.pdf", None).await.is_none());
}

#[tokio::test]
async fn test_resolve_signed_url_is_identity_for_foreign_hosts() {
    let h = harness(MemoryStorage::primary());

    for url in [
        "https://cdn.example.org/resources/a.pdf",
        "https://project.example.co/storage/v1/object/public/resources/a.pdf",
        "not a url",
        "",
    ] {
        assert_eq!(h.gateway.resolve_signed_url(url).await.as_deref(), Some(url));
    }
}

#[tokio::test]
async fn test_resolve_signed_url_signs_primary_urls() {
    let h = harness(MemoryStorage::primary());

    let stored = format!("{}/{}/reports/1-abc123-q3.pdf?old=query", PRIMARY_ENDPOINT, BUCKET);
    let signed = h.gateway.resolve_signed_url(&stored).await.unwrap();
    assert_eq!(
        signed,
        format!(
            "{}/{}/reports/1-abc123-q3.pdf?X-Amz-Expires=3600&X-Amz-Signature=test",
            PRIMARY_ENDPOINT, BUCKET
        )
    );

    let virtual_hosted = "https://resources.s3.us-west-004.backblazeb2.com/reports/x.pdf";
    let signed = h.gateway.resolve_signed_url(virtual_hosted).await.unwrap();
    assert!(signed.contains("/reports/x.pdf?X-Amz-Expires=3600"));
}

#[tokio::test]
async fn test_cancelled_upload_returns_cancelled_result() {
    let h = harness(MemoryStorage::primary().with_put_delay(Duration::from_secs(30)));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some(CANCELLED_MESSAGE));
    h.gateway.drain_metadata().await;
    assert!(h.recorder.records().is_empty());
    assert_eq!(h.secondary.put_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_first_caller_does_not_restart_authorization() {
    let h = harness(MemoryStorage::primary().with_authorize_delay(Duration::from_millis(200)));
    let cancel = CancellationToken::new();

    let uploader = {
        let gateway = Arc::clone(&h.gateway);
        let cancel = cancel.clone();
        tokio::spawn(async move { gateway.upload(pdf(), UploadOptions::default(), &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let waiter = {
        let gateway = Arc::clone(&h.gateway);
        tokio::spawn(async move { gateway.initialize().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = uploader.await.unwrap();
    assert_eq!(result.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(waiter.await.unwrap());
    assert_eq!(h.primary.authorize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.gateway.state(), GatewayState::Ready);
}

#[tokio::test]
async fn test_authorization_completes_after_caller_cancels() {
    let h = harness(MemoryStorage::primary().with_authorize_delay(Duration::from_millis(200)));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;
    assert_eq!(result.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert_eq!(h.gateway.state(), GatewayState::Initializing);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.gateway.state(), GatewayState::Ready);
    assert_eq!(h.gateway.provider_status().preferred, Some(Provider::Primary));

    assert!(h.gateway.initialize().await);
    assert_eq!(h.primary.authorize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.primary.put_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pre_cancelled_operations_do_nothing() {
    let h = harness(MemoryStorage::primary());
    h.primary.insert("reports/a.pdf", b"data");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;
    assert_eq!(result.error.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(!h.gateway.delete("reports/a.pdf", &cancel).await);
    assert!(h.primary.contains("reports/a.pdf"));
    assert!(h.gateway.download("reports/a.pdf", &cancel).await.is_none());
    assert!(h.gateway.list("reports", None, &cancel).await.is_empty());
}

#[tokio::test]
async fn test_metadata_failure_does_not_fail_upload() {
    let h = harness_with(
        configured_credentials(),
        MemoryStorage::primary(),
        MemoryStorage::secondary(),
        RecordingRecorder::failing(),
    );
    let cancel = CancellationToken::new();

    let result = h.gateway.upload(pdf(), UploadOptions::default(), &cancel).await;
    assert!(result.success);

    h.gateway.drain_metadata().await;
    let stats = h.gateway.stats();
    assert_eq!(stats.metadata_failures, 1);
    assert_eq!(stats.metadata_writes, 0);
}

#[tokio::test]
async fn test_upload_options_flow_into_record() {
    let h = harness(MemoryStorage::primary());
    let uploader = Uuid::new_v4();
    let options = UploadOptions {
        title: Some("Quarterly report".to_string()),
        description: Some("Q3 numbers".to_string()),
        uploader_id: Some(uploader),
        thumbnail_url: Some("https://cdn.example.org/thumb.png".to_string()),
        extracted_text: Some("revenue".to_string()),
        metadata: [("category".to_string(), "finance".to_string())].into(),
    };

    h.gateway.upload(pdf(), options, &CancellationToken::new()).await;
    h.gateway.drain_metadata().await;

    let record = h.recorder.records().remove(0);
    assert_eq!(record.title, "Quarterly report");
    assert_eq!(record.description.as_deref(), Some("Q3 numbers"));
    assert_eq!(record.uploader_id, Some(uploader));
    assert_eq!(record.mime_type, "application/pdf");
    assert_eq!(record.file_name, "Q3 Report.pdf");
    assert_eq!(record.metadata["category"], "finance");
}

#[tokio::test]
async fn test_upload_avatar_updates_profile() {
    let h = harness(MemoryStorage::primary());
    let user = Uuid::new_v4();
    let request = UploadRequest::new(b"png".to_vec(), "Me.PNG", Some("image/png".into()), None);

    let result = h.gateway.upload_avatar(request, user, &CancellationToken::new()).await;

    assert!(result.success);
    assert!(result
        .path
        .as_deref()
        .unwrap()
        .starts_with(&format!("avatars/{}/", user)));
    let updates = h.profiles.updates.lock().unwrap().clone();
    assert_eq!(updates, vec![(user, result.url.clone().unwrap())]);

    h.gateway.drain_metadata().await;
    assert_eq!(h.recorder.records()[0].uploader_id, Some(user));
}

#[tokio::test]
async fn test_avatar_profile_failure_leaves_upload_successful() {
    let h = harness(MemoryStorage::primary());
    h.profiles.fail.store(true, Ordering::SeqCst);
    let request = UploadRequest::new(b"png".to_vec(), "me.png", Some("image/png".into()), None);

    let result = h
        .gateway
        .upload_avatar(request, Uuid::new_v4(), &CancellationToken::new())
        .await;

    assert!(result.success);
    assert!(h.primary.contains(result.path.as_deref().unwrap()));
}

#[tokio::test]
async fn test_upload_data_at_explicit_path() {
    let h = harness(MemoryStorage::primary());
    let cancel = CancellationToken::new();

    let result = h
        .gateway
        .upload_data(Bytes::from_static(b"{}"), "exports/data.json", Some("application/json"), &cancel)
        .await;

    assert!(result.success);
    assert_eq!(result.path.as_deref(), Some("exports/data.json"));
    assert_eq!(result.content_type.as_deref(), Some("application/json"));
    assert!(h.primary.contains("exports/data.json"));

    h.gateway.drain_metadata().await;
    assert!(h.recorder.records().is_empty());

    let rejected = h
        .gateway
        .upload_data(Bytes::from_static(b"x"), "/abs/path", None, &cancel)
        .await;
    assert!(!rejected.success);
}

#[tokio::test]
async fn test_upload_auto_keeps_caller_folder() {
    let h = harness(MemoryStorage::primary());
    let cancel = CancellationToken::new();

    let request = UploadRequest::new(b"hello".to_vec(), "hello.txt", None, Some("drafts".into()));
    let result = h
        .gateway
        .upload_auto(request, UploadOptions::default(), &cancel)
        .await;
    assert!(result.success);
    assert!(result.path.unwrap().starts_with("drafts/"));
    assert_eq!(result.content_type.as_deref(), Some("application/octet-stream"));

    let request = UploadRequest::new(b"hello".to_vec(), "hello.txt", None, None).with_folder("/");
    let result = h
        .gateway
        .upload_auto(request, UploadOptions::default(), &cancel)
        .await;
    assert!(result.path.unwrap().starts_with("resources/"));
}

#[tokio::test]
async fn test_list_download_and_public_url_use_preferred_provider() {
    let h = harness(MemoryStorage::primary());
    let cancel = CancellationToken::new();
    h.primary.insert("reports/a.pdf", b"aaaa");
    h.primary.insert("reports/b.pdf", b"bb");
    h.primary.insert("other/c.pdf", b"c");
    h.secondary.insert("reports/z.pdf", b"zz");

    let listed = h.gateway.list("reports/", Some(10), &cancel).await;
    let keys: Vec<_> = listed.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["reports/a.pdf", "reports/b.pdf"]);
    assert_eq!(h.gateway.list("reports/", Some(1), &cancel).await.len(), 1);

    assert_eq!(
        h.gateway.download("reports/a.pdf", &cancel).await,
        Some(Bytes::from_static(b"aaaa"))
    );
    assert_eq!(
        h.gateway.download("reports/z.pdf", &cancel).await,
        Some(Bytes::from_static(b"zz"))
    );
    assert!(h.gateway.download("reports/missing.pdf", &cancel).await.is_none());

    assert_eq!(
        h.gateway.public_url("reports/a.pdf").await,
        format!("{}/{}/reports/a.pdf", PRIMARY_ENDPOINT, BUCKET)
    );
}

#[tokio::test]
async fn test_zero_config_local_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let secondary = LocalStorage::new(dir.path(), "http://localhost:3000/storage")
        .await
        .unwrap();
    let factory = ProviderClientFactory::new(Credentials::new("", "", "", "", ""));
    let gateway = StorageGateway::new(StorageGatewayContext::new(
        Arc::new(factory),
        Arc::new(secondary) as Arc<dyn Storage>,
        Duration::from_secs(3600),
    ));
    let cancel = CancellationToken::new();

    let result = gateway.upload(pdf(), UploadOptions::default(), &cancel).await;
    assert!(result.success);
    assert_eq!(result.provider, Some(Provider::Secondary));

    let path = result.path.unwrap();
    assert!(dir.path().join(&path).exists());
    assert_eq!(
        result.url.as_deref(),
        Some(format!("http://localhost:3000/storage/{}", path).as_str())
    );
    assert!(gateway.delete(&path, &cancel).await);
    assert!(!dir.path().join(&path).exists());
    gateway.drain_metadata().await;
}
