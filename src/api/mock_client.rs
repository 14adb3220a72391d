use crate::api::client::{ByteStream, InboxApi, StreamSource};
use crate::types::{
    HumanResponse, RunResponse, StreamRequest, Thread, ThreadDetail, ThreadStatus,
};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, FutureExt};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Frame one server-sent event.
pub fn sse(event: &str, data: Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

enum ScriptedStream {
    Chunks(Vec<String>),
    Live(mpsc::UnboundedReceiver<Result<Bytes>>),
    OpenFailure(String),
}

/// Feeds a live mock stream chunk by chunk.
#[derive(Clone)]
pub struct LiveStream {
    sender: mpsc::UnboundedSender<Result<Bytes>>,
}

impl LiveStream {
    pub fn send(&self, event: &str, data: Value) -> bool {
        self.send_raw(&sse(event, data))
    }

    pub fn send_raw(&self, chunk: &str) -> bool {
        self.sender
            .send(Ok(Bytes::from(chunk.to_string())))
            .is_ok()
    }

    /// Break the connection with a transport error.
    pub fn fail(&self, message: &str) -> bool {
        self.sender.send(Err(anyhow!(message.to_string()))).is_ok()
    }

    /// True once the consumer dropped the stream.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Default)]
struct MockState {
    streams: HashMap<String, VecDeque<ScriptedStream>>,
    requests: Vec<StreamRequest>,
    threads: Vec<Thread>,
    details: HashMap<String, ThreadDetail>,
    resumes: Vec<(String, HumanResponse)>,
    deleted: Vec<String>,
}

/// Scripted backend: per-thread queues of streams plus canned thread endpoints.
#[derive(Clone, Default)]
pub struct MockApiClient {
    state: Arc<Mutex<MockState>>,
}

impl MockApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream that yields `chunks` (framed when needed) and then ends.
    pub fn push_stream(&self, thread_id: &str, chunks: Vec<String>) {
        self.queue(thread_id, ScriptedStream::Chunks(chunks));
    }

    /// Queue a stream that stays open until the returned handle is dropped.
    pub fn push_live(&self, thread_id: &str) -> LiveStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.queue(thread_id, ScriptedStream::Live(receiver));
        LiveStream { sender }
    }

    pub fn push_open_failure(&self, thread_id: &str, message: &str) {
        self.queue(thread_id, ScriptedStream::OpenFailure(message.to_string()));
    }

    pub fn set_threads(&self, threads: Vec<Thread>) {
        self.lock().threads = threads;
    }

    pub fn set_detail(&self, detail: ThreadDetail) {
        self.lock().details.insert(detail.thread_id.clone(), detail);
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.lock().requests.clone()
    }

    pub fn resumes(&self) -> Vec<(String, HumanResponse)> {
        self.lock().resumes.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    fn queue(&self, thread_id: &str, scripted: ScriptedStream) {
        self.lock()
            .streams
            .entry(thread_id.to_string())
            .or_default()
            .push_back(scripted);
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamSource for MockApiClient {
    fn open(&self, request: StreamRequest) -> BoxFuture<'static, Result<ByteStream>> {
        let scripted = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state
                .streams
                .get_mut(request.thread_id())
                .and_then(VecDeque::pop_front)
        };

        let opened: Result<ByteStream> = match scripted {
            None => Err(anyhow!(
                "MockApiClient: no stream configured for thread '{}'",
                request.thread_id()
            )),
            Some(ScriptedStream::OpenFailure(message)) => Err(anyhow!(message)),
            Some(ScriptedStream::Chunks(chunks)) => {
                let items: Vec<Result<Bytes>> = chunks
                    .into_iter()
                    .map(|chunk| {
                        let framed = if chunk.ends_with("\n\n") {
                            chunk
                        } else {
                            format!("{chunk}\n\n")
                        };
                        Ok(Bytes::from(framed))
                    })
                    .collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Some(ScriptedStream::Live(receiver)) => Ok(Box::pin(stream::unfold(
                receiver,
                |mut receiver| async move { receiver.recv().await.map(|item| (item, receiver)) },
            ))),
        };

        async move { opened }.boxed()
    }
}

impl InboxApi for MockApiClient {
    fn list_threads(&self, status: Option<ThreadStatus>) -> BoxFuture<'_, Result<Vec<Thread>>> {
        let threads: Vec<Thread> = self
            .lock()
            .threads
            .iter()
            .filter(|thread| status.map_or(true, |wanted| thread.status == wanted))
            .cloned()
            .collect();
        async move { Ok(threads) }.boxed()
    }

    fn get_thread<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<ThreadDetail>> {
        let detail = self.lock().details.get(thread_id).cloned();
        async move { detail.ok_or_else(|| anyhow!("thread {thread_id} not found")) }.boxed()
    }

    fn resume_thread<'a>(
        &'a self,
        thread_id: &'a str,
        response: &'a HumanResponse,
    ) -> BoxFuture<'a, Result<RunResponse>> {
        let result = {
            let mut state = self.lock();
            state
                .resumes
                .push((thread_id.to_string(), response.clone()));
            match state.details.get_mut(thread_id) {
                Some(detail) if detail.status == ThreadStatus::Interrupted => {
                    detail.status = ThreadStatus::Idle;
                    detail.interrupt = None;
                    Ok(RunResponse {
                        thread_id: thread_id.to_string(),
                        status: "completed".to_string(),
                        result: None,
                        interrupt: None,
                    })
                }
                Some(detail) => Err(anyhow!(
                    "Thread {thread_id} is not interrupted (status: {})",
                    detail.status
                )),
                None => Err(anyhow!("thread {thread_id} not found")),
            }
        };
        async move { result }.boxed()
    }

    fn delete_thread<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<()>> {
        {
            let mut state = self.lock();
            state.deleted.push(thread_id.to_string());
            state.threads.retain(|thread| thread.thread_id != thread_id);
            state.details.remove(thread_id);
        }
        async move { Ok(()) }.boxed()
    }
}
