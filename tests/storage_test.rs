//! SQLite session store tests.

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use research_engine::pipeline::{Session, SessionStatus};
use research_engine::storage::{SqliteStorage, Storage};

async fn store() -> (SqliteStorage, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::new(&dir.path().join("sessions.db"), 2)
        .await
        .unwrap();
    (storage, dir)
}

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let (storage, _dir) = store().await;

    let session = Session::new("what is the capital of assyria");
    storage.save_session(&session).await.unwrap();

    let loaded = storage
        .load_session(&session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.session_id, session.session_id);
    assert_eq!(loaded.initial_query, session.initial_query);
    assert_eq!(loaded.status, SessionStatus::InProgress);
    assert_eq!(loaded.stages.len(), 4);
}

#[tokio::test]
async fn test_missing_session_loads_as_none() {
    let (storage, _dir) = store().await;
    let loaded = storage.load_session("nope").await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_save_is_an_upsert() {
    let (storage, _dir) = store().await;

    let mut session = Session::new("q");
    storage.save_session(&session).await.unwrap();

    session.status = SessionStatus::Completed;
    session.touch();
    storage.save_session(&session).await.unwrap();

    let loaded = storage
        .load_session(&session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, SessionStatus::Completed);

    let summaries = storage.list_sessions().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status, "completed");
}

#[tokio::test]
async fn test_list_orders_by_most_recent_update() {
    let (storage, _dir) = store().await;

    let first = Session::new("older");
    storage.save_session(&first).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let second = Session::new("newer");
    storage.save_session(&second).await.unwrap();

    let summaries = storage.list_sessions().await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].initial_query, "newer");
    assert_eq!(summaries[1].initial_query, "older");
}

#[tokio::test]
async fn test_delete_session() {
    let (storage, _dir) = store().await;

    let session = Session::new("q");
    storage.save_session(&session).await.unwrap();
    storage.delete_session(&session.session_id).await.unwrap();

    assert!(storage
        .load_session(&session.session_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_delete_missing_session_is_not_found() {
    let (storage, _dir) = store().await;
    let err = storage.delete_session("ghost").await.unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn test_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.db");

    let session = Session::new("persistent");
    {
        let storage = SqliteStorage::new(&path, 1).await.unwrap();
        storage.save_session(&session).await.unwrap();
    }

    let storage = SqliteStorage::new(&path, 1).await.unwrap();
    let loaded = storage
        .load_session(&session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.initial_query, "persistent");
}
