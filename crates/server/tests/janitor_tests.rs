//! Janitor sweep behavior.

mod common;

use common::{TestServer, init_upload, send_chunk};
use std::time::Duration;
use stevedore_core::config::JanitorConfig;
use stevedore_metadata::SessionRow;
use stevedore_server::Janitor;
use time::OffsetDateTime;

fn janitor_for(server: &TestServer, config: JanitorConfig) -> Janitor {
    Janitor::new(
        server.metadata(),
        server.coordinator().targets().clone(),
        server.coordinator().scratch().clone(),
        config,
    )
}

/// Insert a session whose created_at lies `age` in the past.
async fn insert_aged_session(
    server: &TestServer,
    upload_id: &str,
    status: &str,
    age: time::Duration,
) {
    let created_at = OffsetDateTime::now_utc() - age;
    let row = SessionRow {
        upload_id: upload_id.to_string(),
        filename: "a.bin".to_string(),
        total_size: 12,
        chunk_size: 4,
        total_chunks: 3,
        status: status.to_string(),
        final_hash: None,
        created_at,
        updated_at: created_at,
    };
    server.metadata().create_session(&row, 3).await.unwrap();
}

/// Write some bytes into a session's target file.
async fn write_target(server: &TestServer, upload_id: &str, data: &[u8]) {
    let spool = server.root.join(format!("spool-{upload_id}"));
    tokio::fs::write(&spool, data).await.unwrap();
    server
        .coordinator()
        .targets()
        .write_chunk(upload_id, 0, 0, data.len() as u64, &spool)
        .await
        .unwrap();
    tokio::fs::remove_file(&spool).await.unwrap();
}

/// An abandoned UPLOADING session past retention loses its file, its record,
/// and its chunk rows.
#[tokio::test]
async fn test_reclaims_expired_uploading_session() {
    let server = TestServer::new().await;
    insert_aged_session(&server, "u2", "UPLOADING", time::Duration::hours(25)).await;
    write_target(&server, "u2", b"abcd").await;
    server
        .metadata()
        .mark_chunk_received("u2", 0, OffsetDateTime::now_utc())
        .await
        .unwrap();

    let janitor = janitor_for(&server, JanitorConfig::default());
    let stats = janitor.sweep_once().await.unwrap();
    assert_eq!(stats.expired_sessions, 1);
    assert_eq!(stats.errors, 0);

    assert!(!server.target_path("u2").exists());
    assert!(server.metadata().get_session("u2").await.unwrap().is_none());
    assert!(server.metadata().list_chunks("u2").await.unwrap().is_empty());
}

/// Old FAILED sessions are also reclaimed.
#[tokio::test]
async fn test_reclaims_expired_failed_session() {
    let server = TestServer::new().await;
    insert_aged_session(&server, "dead", "FAILED", time::Duration::hours(30)).await;

    let janitor = janitor_for(&server, JanitorConfig::default());
    let stats = janitor.sweep_once().await.unwrap();
    assert_eq!(stats.expired_sessions, 1);
    assert!(
        server
            .metadata()
            .get_session("dead")
            .await
            .unwrap()
            .is_none()
    );
}

/// COMPLETED and PROCESSING sessions are never candidates, however old.
#[tokio::test]
async fn test_spares_completed_and_processing_sessions() {
    let server = TestServer::new().await;
    insert_aged_session(&server, "done", "COMPLETED", time::Duration::hours(25)).await;
    write_target(&server, "done", b"abcd").await;
    insert_aged_session(&server, "busy", "PROCESSING", time::Duration::hours(25)).await;

    let janitor = janitor_for(&server, JanitorConfig::default());
    let stats = janitor.sweep_once().await.unwrap();
    assert_eq!(stats.expired_sessions, 0);

    assert!(server.target_path("done").exists());
    assert!(server.metadata().get_session("done").await.unwrap().is_some());
    assert!(server.metadata().get_session("busy").await.unwrap().is_some());
}

/// Sessions inside the retention horizon survive.
#[tokio::test]
async fn test_spares_fresh_sessions() {
    let server = TestServer::new().await;
    init_upload(&server.router, "fresh", "a.bin", 10).await;
    send_chunk(&server.router, "fresh", 0, 3, b"abcd").await;

    let janitor = janitor_for(&server, JanitorConfig::default());
    let stats = janitor.sweep_once().await.unwrap();
    assert_eq!(stats.expired_sessions, 0);
    assert!(server.target_path("fresh").exists());
}

/// Stale scratch files are removed; fresh ones are left for their requests.
#[tokio::test]
async fn test_scratch_sweep_honors_ttl() {
    let server = TestServer::new().await;
    let scratch_root = server.coordinator().scratch().root().to_path_buf();
    tokio::fs::write(scratch_root.join("chunk-orphan.part"), b"leftover")
        .await
        .unwrap();

    // Default one-hour TTL keeps the file.
    let janitor = janitor_for(&server, JanitorConfig::default());
    let stats = janitor.sweep_once().await.unwrap();
    assert_eq!(stats.scratch_files, 0);
    assert!(scratch_root.join("chunk-orphan.part").exists());

    // A zero TTL reclaims it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let janitor = janitor_for(
        &server,
        JanitorConfig {
            scratch_ttl_secs: 0,
            ..Default::default()
        },
    );
    let stats = janitor.sweep_once().await.unwrap();
    assert_eq!(stats.scratch_files, 1);
    assert!(!scratch_root.join("chunk-orphan.part").exists());
}

/// A target file that cannot be removed keeps its session for the next sweep.
#[tokio::test]
async fn test_unremovable_target_defers_session_deletion() {
    let server = TestServer::new().await;
    insert_aged_session(&server, "stuck", "UPLOADING", time::Duration::hours(25)).await;

    // A non-empty directory at the target path makes remove_file fail.
    let target = server.target_path("stuck");
    tokio::fs::create_dir_all(target.join("nested")).await.unwrap();

    let janitor = janitor_for(&server, JanitorConfig::default());
    let stats = janitor.sweep_once().await.unwrap();
    assert_eq!(stats.expired_sessions, 0);
    assert_eq!(stats.errors, 1);
    assert!(
        server
            .metadata()
            .get_session("stuck")
            .await
            .unwrap()
            .is_some()
    );
}
