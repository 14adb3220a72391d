use chrono::Utc;
use inbox_stream::api::mock_client::{sse, MockApiClient};
use inbox_stream::types::{Thread, ThreadStatus};
use inbox_stream::{Config, Inbox};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn server_thread(id: &str, status: ThreadStatus) -> Thread {
    Thread {
        thread_id: id.to_string(),
        status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        question: Some(format!("question for {id}")),
        interrupt_description: None,
    }
}

fn inbox(mock: &MockApiClient) -> Arc<Inbox<MockApiClient>> {
    Arc::new(Inbox::new(Arc::new(mock.clone()), &Config::default()))
}

#[tokio::test]
async fn test_refresh_keeps_running_thread_until_server_lists_it() {
    let mock = MockApiClient::new();
    mock.set_threads(vec![server_thread("old", ThreadStatus::Idle)]);
    let live = mock.push_live("new");
    let inbox = inbox(&mock);

    inbox.ask("ping", Some("new")).unwrap();
    let threads = inbox.refresh(None).await.unwrap();
    let ids: Vec<&str> = threads.iter().map(|t| t.thread_id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
    assert_eq!(threads[0].status, ThreadStatus::Busy);

    mock.set_threads(vec![
        server_thread("new", ThreadStatus::Busy),
        server_thread("old", ThreadStatus::Idle),
    ]);
    let threads = inbox.refresh(None).await.unwrap();
    let ids: Vec<&str> = threads.iter().map(|t| t.thread_id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
    assert_eq!(threads[0].question.as_deref(), Some("question for new"));
    drop(live);
}

#[tokio::test]
async fn test_refresh_drops_provisional_after_run_ends_unpersisted() {
    let mock = MockApiClient::new();
    mock.push_stream("gone", vec![sse("error", json!({"error": "backend crashed"}))]);
    let inbox = inbox(&mock);
    let mut updates = inbox.registry().subscribe();

    inbox.ask("ping", Some("gone")).unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(update) = updates.recv().await {
            if matches!(update, inbox_stream::SessionUpdate::Completed { .. }) {
                break;
            }
        }
    })
    .await
    .unwrap();

    assert!(inbox.refresh(None).await.unwrap().is_empty());
    assert!(inbox.registry().snapshot("gone").is_some());
}

#[tokio::test]
async fn test_refresh_filters_by_status() {
    let mock = MockApiClient::new();
    mock.set_threads(vec![
        server_thread("a", ThreadStatus::Idle),
        server_thread("b", ThreadStatus::Interrupted),
    ]);
    let inbox = inbox(&mock);
    let threads = inbox.refresh(Some(ThreadStatus::Interrupted)).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].thread_id, "b");
}

#[tokio::test]
async fn test_delete_leaves_no_registry_entry() {
    let mock = MockApiClient::new();
    mock.set_threads(vec![server_thread("t1", ThreadStatus::Busy)]);
    let live = mock.push_live("t1");
    let inbox = inbox(&mock);
    inbox.ask("q", Some("t1")).unwrap();

    inbox.delete("t1").await.unwrap();
    assert!(!inbox.registry().contains("t1"));
    assert!(inbox.refresh(None).await.unwrap().is_empty());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !live.is_closed() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_refresher_runs_after_completion_and_stops_on_cancel() {
    let mock = MockApiClient::new();
    let live = mock.push_live("t1");
    let inbox = inbox(&mock);
    let cancel = CancellationToken::new();
    let refresher = inbox.spawn_refresher(Duration::from_secs(3600), cancel.clone());

    inbox.ask("q", Some("t1")).unwrap();
    // Let the immediate first tick pass before the server learns about the thread.
    tokio::time::sleep(Duration::from_millis(50)).await;
    mock.set_threads(vec![server_thread("t1", ThreadStatus::Idle)]);
    live.send("done", json!({"answer": "ok"}));

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let threads = inbox.threads();
            if threads.len() == 1 && threads[0].status == ThreadStatus::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), refresher)
        .await
        .unwrap()
        .unwrap();
}
