use crate::api::client::InboxApi;
use crate::config::Config;
use crate::error::{InvalidResumeReason, SessionError};
use crate::state::{
    InterruptCoordinator, RegistryConfig, SessionPhase, SessionUpdate, StreamRegistry, StreamState,
    ThreadBook,
};
use crate::types::{HumanResponse, Thread, ThreadDetail, ThreadStatus};
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outcome of answering an interrupt.
#[derive(Debug, Clone, PartialEq)]
pub enum Resumed {
    /// The run continues on the thread's stream.
    Streaming(StreamState),
    /// Answered through the blocking endpoint; the refreshed thread.
    Completed(ThreadDetail),
}

/// Thread list, live streams and the backend behind one handle.
pub struct Inbox<C> {
    client: Arc<C>,
    registry: StreamRegistry,
    book: Mutex<ThreadBook>,
    streaming_resume: bool,
}

impl<C: InboxApi + 'static> Inbox<C> {
    pub fn new(client: Arc<C>, config: &Config) -> Self {
        let source: Arc<dyn crate::api::StreamSource> = client.clone();
        let registry = StreamRegistry::new(source, RegistryConfig::from_config(config));
        Self::with_registry(client, registry, config.streaming_resume)
    }

    pub fn with_registry(client: Arc<C>, registry: StreamRegistry, streaming_resume: bool) -> Self {
        Self {
            client,
            registry,
            book: Mutex::new(ThreadBook::new()),
            streaming_resume,
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Start a run. A new thread id is generated unless one is given.
    pub fn ask(&self, question: &str, thread_id: Option<&str>) -> Result<String, SessionError> {
        let thread_id = thread_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.registry.start(&thread_id, question)?;
        self.book()
            .add_provisional(Thread::provisional(&thread_id, Some(question.to_string())));
        Ok(thread_id)
    }

    /// Answer a pending interrupt. Streams the continuation when this process
    /// holds the paused session, otherwise posts to the blocking endpoint.
    /// A thread whose run is streaming here cannot be answered again.
    pub async fn respond(&self, thread_id: &str, response: HumanResponse) -> Result<Resumed> {
        let invalid = |reason: InvalidResumeReason| SessionError::InvalidResume {
            thread_id: thread_id.to_string(),
            reason,
        };

        match self.registry.phase(thread_id) {
            Some(SessionPhase::Streaming) => {
                let reason = InvalidResumeReason::NotInterrupted(SessionPhase::Streaming);
                return Err(invalid(reason).into());
            }
            Some(_) if self.streaming_resume && self.registry.awaiting_decision(thread_id) => {
                let state = self.registry.resume(thread_id, response)?;
                return Ok(Resumed::Streaming(state));
            }
            _ => {}
        }

        let detail = self.client.get_thread(thread_id).await?;
        if detail.status != ThreadStatus::Interrupted {
            let reason = InvalidResumeReason::NotInterruptedOnServer(detail.status);
            return Err(invalid(reason).into());
        }
        let Some(interrupt) = detail.interrupt.as_ref() else {
            bail!("thread {thread_id} is interrupted but carries no interrupt");
        };
        InterruptCoordinator::validate(interrupt, &response).map_err(invalid)?;

        let run = self.client.resume_thread(thread_id, &response).await?;
        tracing::info!(thread_id, status = %run.status, "resumed without streaming");
        let detail = self.client.get_thread(thread_id).await?;
        Ok(Resumed::Completed(detail))
    }

    /// Fetch the server list and merge in threads that are still provisional.
    pub async fn refresh(&self, status: Option<ThreadStatus>) -> Result<Vec<Thread>> {
        let server = self.client.list_threads(status).await?;
        let active = self.registry.get_all_streaming_thread_ids();
        let merged = self.book().reconcile(&server, &active).to_vec();
        tracing::debug!(
            server = server.len(),
            merged = merged.len(),
            "thread list refreshed"
        );
        Ok(merged)
    }

    pub async fn thread_detail(&self, thread_id: &str) -> Result<ThreadDetail> {
        self.client.get_thread(thread_id).await
    }

    /// Delete on the server, then drop every local trace of the thread.
    pub async fn delete(&self, thread_id: &str) -> Result<()> {
        self.client.delete_thread(thread_id).await?;
        self.registry.clear(thread_id);
        self.book().remove(thread_id);
        tracing::info!(thread_id, "thread deleted");
        Ok(())
    }

    /// Last merged thread list.
    pub fn threads(&self) -> Vec<Thread> {
        self.book().threads().to_vec()
    }

    /// Refresh on every tick of `interval` and right after any run completes.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inbox = Arc::clone(self);
        let mut updates = self.registry.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                    update = updates.recv() => match update {
                        Some(SessionUpdate::Completed { .. }) => {}
                        Some(SessionUpdate::Updated { .. }) => continue,
                        None => break,
                    },
                }
                if let Err(error) = inbox.refresh(None).await {
                    tracing::warn!("thread list refresh failed: {error:#}");
                }
            }
            tracing::debug!("refresher stopped");
        })
    }

    fn book(&self) -> MutexGuard<'_, ThreadBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::{sse, MockApiClient};
    use crate::types::{ActionRequest, HumanInterrupt, InterruptConfig, ResponseKind};
    use chrono::Utc;
    use serde_json::{json, Map};

    fn inbox(mock: &MockApiClient) -> Inbox<MockApiClient> {
        Inbox::new(Arc::new(mock.clone()), &Config::default())
    }

    fn interrupted_detail(thread_id: &str, config: InterruptConfig) -> ThreadDetail {
        ThreadDetail {
            thread_id: thread_id.to_string(),
            status: ThreadStatus::Interrupted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            messages: Vec::new(),
            interrupt: Some(HumanInterrupt {
                action_request: ActionRequest {
                    action: "send-mail".to_string(),
                    args: Map::new(),
                },
                config,
                description: None,
            }),
        }
    }

    async fn wait_for_completion(updates: &mut crate::state::Subscription) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(update) = updates.recv().await {
                if matches!(update, SessionUpdate::Completed { .. }) {
                    break;
                }
            }
        })
        .await
        .unwrap();
    }

    fn interrupt_event(thread_id: &str) -> String {
        sse(
            "interrupt",
            json!({"thread_id": thread_id, "status": "interrupted", "interrupt": {
                "action_request": {"action": "send-mail", "args": {}},
                "config": {"allow_accept": true}
            }}),
        )
    }

    #[tokio::test]
    async fn test_ask_generates_id_and_records_provisional_thread() {
        let mock = MockApiClient::new();
        let inbox = inbox(&mock);
        let thread_id = inbox.ask("ping", None).unwrap();
        assert!(uuid::Uuid::parse_str(&thread_id).is_ok());

        let threads = inbox.threads();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].thread_id, thread_id);
        assert_eq!(threads[0].status, ThreadStatus::Busy);
        assert_eq!(threads[0].question.as_deref(), Some("ping"));
    }

    #[tokio::test]
    async fn test_duplicate_ask_does_not_touch_thread_book() {
        let mock = MockApiClient::new();
        let _live = mock.push_live("t1");
        let inbox = inbox(&mock);
        inbox.ask("first", Some("t1")).unwrap();
        assert_eq!(
            inbox.ask("second", Some("t1")),
            Err(SessionError::DuplicateStart("t1".to_string()))
        );
        assert_eq!(inbox.threads()[0].question.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_fallback_resume_validates_then_posts() {
        let mock = MockApiClient::new();
        mock.set_detail(interrupted_detail(
            "t9",
            InterruptConfig {
                allow_accept: true,
                ..InterruptConfig::default()
            },
        ));
        let inbox = inbox(&mock);

        let rejected = inbox
            .respond("t9", HumanResponse::respond("edit later"))
            .await
            .unwrap_err();
        assert_eq!(
            rejected.downcast_ref::<SessionError>(),
            Some(&SessionError::InvalidResume {
                thread_id: "t9".to_string(),
                reason: InvalidResumeReason::Disallowed(ResponseKind::Respond),
            })
        );
        assert!(mock.resumes().is_empty());

        let resumed = inbox.respond("t9", HumanResponse::Accept).await.unwrap();
        match resumed {
            Resumed::Completed(detail) => {
                assert_eq!(detail.status, ThreadStatus::Idle);
                assert!(detail.interrupt.is_none());
            }
            other => panic!("expected blocking resume, got {other:?}"),
        }
        assert_eq!(mock.resumes(), vec![("t9".to_string(), HumanResponse::Accept)]);
    }

    #[tokio::test]
    async fn test_streaming_resume_used_for_paused_session() {
        let mock = MockApiClient::new();
        mock.push_stream(
            "t2",
            vec![sse(
                "interrupt",
                json!({"thread_id": "t2", "status": "interrupted", "interrupt": {
                    "action_request": {"action": "send-mail", "args": {}},
                    "config": {"allow_accept": true}
                }}),
            )],
        );
        let _continuation = mock.push_live("t2");
        let inbox = inbox(&mock);
        let mut updates = inbox.registry().subscribe();
        inbox.ask("send it", Some("t2")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(update) = updates.recv().await {
                if matches!(update, SessionUpdate::Completed { .. }) {
                    break;
                }
            }
        })
        .await
        .unwrap();

        let resumed = inbox.respond("t2", HumanResponse::Accept).await.unwrap();
        assert!(matches!(resumed, Resumed::Streaming(state) if state.is_streaming));
        tokio::time::timeout(Duration::from_secs(5), async {
            while mock.requests().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(matches!(
            &mock.requests()[1],
            crate::types::StreamRequest::Resume { response: HumanResponse::Accept, .. }
        ));
        assert!(mock.resumes().is_empty());
    }

    #[tokio::test]
    async fn test_second_response_rejected_while_resumed_run_streams() {
        let mock = MockApiClient::new();
        mock.push_stream("t2", vec![interrupt_event("t2")]);
        let _continuation = mock.push_live("t2");
        // The backend marks the thread busy but leaves the old interrupt behind.
        let mut stale = interrupted_detail("t2", InterruptConfig::all());
        stale.status = ThreadStatus::Busy;
        mock.set_detail(stale);
        let inbox = inbox(&mock);
        let mut updates = inbox.registry().subscribe();
        inbox.ask("send it", Some("t2")).unwrap();
        wait_for_completion(&mut updates).await;

        let first = inbox.respond("t2", HumanResponse::Accept).await.unwrap();
        assert!(matches!(first, Resumed::Streaming(_)));

        let second = inbox
            .respond("t2", HumanResponse::Accept)
            .await
            .unwrap_err();
        assert_eq!(
            second.downcast_ref::<SessionError>(),
            Some(&SessionError::InvalidResume {
                thread_id: "t2".to_string(),
                reason: InvalidResumeReason::NotInterrupted(SessionPhase::Streaming),
            })
        );
        assert!(mock.resumes().is_empty());
        assert_eq!(inbox.registry().phase("t2"), Some(SessionPhase::Streaming));
    }

    #[tokio::test]
    async fn test_fallback_resume_requires_server_interrupted_status() {
        let mock = MockApiClient::new();
        let mut busy = interrupted_detail("t3", InterruptConfig::all());
        busy.status = ThreadStatus::Busy;
        mock.set_detail(busy);
        let inbox = inbox(&mock);

        let error = inbox
            .respond("t3", HumanResponse::Accept)
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<SessionError>(),
            Some(&SessionError::InvalidResume {
                thread_id: "t3".to_string(),
                reason: InvalidResumeReason::NotInterruptedOnServer(ThreadStatus::Busy),
            })
        );
        assert!(mock.resumes().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_resume_retried_after_open_failure() {
        let mock = MockApiClient::new();
        mock.push_stream("t4", vec![interrupt_event("t4")]);
        mock.push_open_failure("t4", "connection refused");
        mock.push_stream("t4", vec![sse("done", json!({"answer": "sent"}))]);
        let inbox = inbox(&mock);
        let mut updates = inbox.registry().subscribe();
        inbox.ask("send it", Some("t4")).unwrap();
        wait_for_completion(&mut updates).await;

        inbox.respond("t4", HumanResponse::Accept).await.unwrap();
        wait_for_completion(&mut updates).await;
        assert_eq!(inbox.registry().phase("t4"), Some(SessionPhase::Error));

        let retried = inbox.respond("t4", HumanResponse::Accept).await.unwrap();
        assert!(matches!(retried, Resumed::Streaming(_)));
        wait_for_completion(&mut updates).await;
        let state = inbox.registry().snapshot("t4").unwrap();
        assert_eq!(state.final_answer.as_deref(), Some("sent"));
        assert!(mock.resumes().is_empty());
    }

    #[tokio::test]
    async fn test_delete_clears_registry_and_book() {
        let mock = MockApiClient::new();
        let _live = mock.push_live("t1");
        let inbox = inbox(&mock);
        inbox.ask("q", Some("t1")).unwrap();

        inbox.delete("t1").await.unwrap();
        assert!(!inbox.registry().contains("t1"));
        assert!(inbox.threads().is_empty());
        assert_eq!(mock.deleted(), vec!["t1".to_string()]);
    }
}
