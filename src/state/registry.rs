use super::bus::{CallbackBus, SubscriberId, Subscription};
use super::session::{Applied, SessionPhase, StreamSession, StreamState};
use crate::api::client::{ByteStream, StreamSource};
use crate::api::codec::decode;
use crate::api::stream::{SseFrame, SseParser};
use crate::config::Config;
use crate::error::{InvalidResumeReason, SessionError};
use crate::types::{HumanResponse, ResponseKind, StreamRequest};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Fail a run when no bytes arrive for this long. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl RegistryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
        }
    }
}

struct Entry {
    session: StreamSession,
    generation: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Entry {
    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Inner {
    sessions: Mutex<HashMap<String, Entry>>,
    bus: CallbackBus,
    source: Arc<dyn StreamSource>,
    config: RegistryConfig,
    generations: AtomicU64,
}

/// How the read loop should proceed after handing a signal to the session.
enum Progress {
    Continue,
    /// Terminal signal applied, or the session was cleared or replaced.
    Stop,
}

/// Maps thread ids to their live session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<Inner>,
}

impl StreamRegistry {
    pub fn new(source: Arc<dyn StreamSource>, config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                bus: CallbackBus::new(),
                source,
                config,
                generations: AtomicU64::new(1),
            }),
        }
    }

    /// Open a fresh run for `thread_id`. A finished, errored or interrupted
    /// session under the same id is replaced; a streaming one is rejected.
    pub fn start(&self, thread_id: &str, question: &str) -> Result<StreamState, SessionError> {
        let runtime = current_runtime()?;
        let mut sessions = self.inner.lock();
        if let Some(existing) = sessions.get_mut(thread_id) {
            if existing.session.phase() == SessionPhase::Streaming {
                return Err(SessionError::DuplicateStart(thread_id.to_string()));
            }
            existing.stop();
        }

        let session = StreamSession::start(thread_id, question);
        let snapshot = session.snapshot();
        let generation = self.inner.next_generation();
        let cancel = CancellationToken::new();
        let request = StreamRequest::Start {
            thread_id: thread_id.to_string(),
            question: question.to_string(),
        };

        tracing::info!(thread_id, generation, "starting run");
        self.inner.bus.notify_update(thread_id, snapshot.clone());
        let task = self.spawn_run(&runtime, thread_id, generation, request, cancel.clone());
        sessions.insert(
            thread_id.to_string(),
            Entry {
                session,
                generation,
                cancel,
                task: Some(task),
            },
        );
        Ok(snapshot)
    }

    /// Answer the pending interrupt and stream the rest of the run into the
    /// same step log. Also retries an answer whose resume stream failed
    /// before delivering anything.
    pub fn resume(
        &self,
        thread_id: &str,
        response: HumanResponse,
    ) -> Result<StreamState, SessionError> {
        let runtime = current_runtime()?;
        let mut sessions = self.inner.lock();
        let entry = sessions
            .get_mut(thread_id)
            .ok_or_else(|| SessionError::InvalidResume {
                thread_id: thread_id.to_string(),
                reason: InvalidResumeReason::NoSession,
            })?;

        let answered = entry.session.begin_resume(&response)?;
        entry.stop();
        entry.generation = self.inner.next_generation();
        entry.cancel = CancellationToken::new();

        tracing::info!(
            thread_id,
            action = answered.action(),
            response = %response.kind(),
            "resuming run"
        );
        let snapshot = entry.session.snapshot();
        self.inner.bus.notify_update(thread_id, snapshot.clone());
        let request = StreamRequest::Resume {
            thread_id: thread_id.to_string(),
            response,
        };
        entry.task = Some(self.spawn_run(
            &runtime,
            thread_id,
            entry.generation,
            request,
            entry.cancel.clone(),
        ));
        Ok(snapshot)
    }

    /// Cancel the thread's reader and forget the session. Returns whether a
    /// session existed; clearing twice is harmless.
    pub fn clear(&self, thread_id: &str) -> bool {
        let removed = self.inner.lock().remove(thread_id);
        match removed {
            Some(mut entry) => {
                entry.stop();
                tracing::debug!(thread_id, "cleared session");
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, thread_id: &str) -> Option<StreamState> {
        self.inner
            .lock()
            .get(thread_id)
            .map(|entry| entry.session.snapshot())
    }

    pub fn phase(&self, thread_id: &str) -> Option<SessionPhase> {
        self.inner
            .lock()
            .get(thread_id)
            .map(|entry| entry.session.phase())
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.inner.lock().contains_key(thread_id)
    }

    /// Point-in-time set of threads whose run is still streaming.
    pub fn get_all_streaming_thread_ids(&self) -> HashSet<String> {
        self.inner
            .lock()
            .iter()
            .filter(|(_, entry)| entry.session.phase() == SessionPhase::Streaming)
            .map(|(thread_id, _)| thread_id.clone())
            .collect()
    }

    /// Whether `resume` would accept a decision for this thread.
    pub fn awaiting_decision(&self, thread_id: &str) -> bool {
        self.inner
            .lock()
            .get(thread_id)
            .is_some_and(|entry| entry.session.awaiting_decision())
    }

    pub fn can_submit(&self, thread_id: &str, kind: ResponseKind) -> bool {
        self.inner
            .lock()
            .get(thread_id)
            .is_some_and(|entry| entry.session.can_submit(kind))
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    /// Cancel every live reader and drop all sessions.
    pub fn shutdown(&self) {
        self.inner.stop_all();
    }

    fn spawn_run(
        &self,
        runtime: &Handle,
        thread_id: &str,
        generation: u64,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let source = Arc::clone(&self.inner.source);
        let idle_timeout = self.inner.config.idle_timeout;
        let thread_id = thread_id.to_string();

        runtime.spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = read_run(&inner, source, &thread_id, generation, request, idle_timeout) => outcome,
            };
            if let Err(error) = outcome {
                if let Some(inner) = inner.upgrade() {
                    inner.fail(&thread_id, generation, &error);
                }
            }
        })
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    fn apply(&self, thread_id: &str, generation: u64, frame: &SseFrame) -> Progress {
        let signal = match decode(frame) {
            Ok(Some(signal)) => signal,
            Ok(None) => return Progress::Continue,
            Err(error) => {
                tracing::warn!(thread_id, %error, "dropping stream event");
                return Progress::Continue;
            }
        };
        tracing::debug!(thread_id, event = %frame.event, "decoded stream event");

        let mut sessions = self.lock();
        let Some(entry) = sessions
            .get_mut(thread_id)
            .filter(|entry| entry.generation == generation)
        else {
            return Progress::Stop;
        };

        match entry.session.apply(signal) {
            Applied::Appended(_) => {
                self.bus.notify_update(thread_id, entry.session.snapshot());
                Progress::Continue
            }
            Applied::Finished(phase) => {
                entry.task = None;
                self.bus.notify_update(thread_id, entry.session.snapshot());
                self.bus.notify_complete(thread_id);
                tracing::info!(thread_id, %phase, "run finished");
                Progress::Stop
            }
            Applied::Ignored => Progress::Stop,
        }
    }

    fn fail(&self, thread_id: &str, generation: u64, error: &SessionError) {
        let mut sessions = self.lock();
        let Some(entry) = sessions
            .get_mut(thread_id)
            .filter(|entry| entry.generation == generation)
        else {
            return;
        };
        if entry.session.fail(error) {
            entry.task = None;
            tracing::error!(thread_id, %error, "run failed");
            self.bus.notify_update(thread_id, entry.session.snapshot());
            self.bus.notify_complete(thread_id);
        }
    }

    fn stop_all(&self) {
        let drained: Vec<(String, Entry)> = self.lock().drain().collect();
        for (thread_id, mut entry) in drained {
            entry.stop();
            tracing::debug!(thread_id, "stopped session on shutdown");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn read_run(
    inner: &Weak<Inner>,
    source: Arc<dyn StreamSource>,
    thread_id: &str,
    generation: u64,
    request: StreamRequest,
    idle_timeout: Option<Duration>,
) -> Result<(), SessionError> {
    let mut stream = source
        .open(request)
        .await
        .map_err(|error| SessionError::Connection(format!("{error:#}")))?;
    let mut parser = SseParser::new();

    while let Some(chunk) = next_chunk(&mut stream, idle_timeout).await? {
        let chunk = chunk.map_err(|error| SessionError::Connection(format!("{error:#}")))?;
        if let Progress::Stop = apply_frames(inner, thread_id, generation, parser.process(&chunk)) {
            return Ok(());
        }
    }

    // An unterminated last event still counts.
    if let Progress::Stop = apply_frames(inner, thread_id, generation, parser.process(b"\n\n")) {
        return Ok(());
    }
    Err(SessionError::Connection(
        "stream closed before a terminal event".to_string(),
    ))
}

async fn next_chunk(
    stream: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<anyhow::Result<bytes::Bytes>>, SessionError> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.next())
            .await
            .map_err(|_| {
                SessionError::Connection(format!(
                    "no data received for {} ms",
                    limit.as_millis()
                ))
            }),
        None => Ok(stream.next().await),
    }
}

fn apply_frames(
    inner: &Weak<Inner>,
    thread_id: &str,
    generation: u64,
    frames: Vec<SseFrame>,
) -> Progress {
    let Some(inner) = inner.upgrade() else {
        return Progress::Stop;
    };
    for frame in &frames {
        if let Progress::Stop = inner.apply(thread_id, generation, frame) {
            return Progress::Stop;
        }
    }
    Progress::Continue
}

fn current_runtime() -> Result<Handle, SessionError> {
    Handle::try_current()
        .map_err(|error| SessionError::Connection(format!("no async runtime available: {error}")))
}

static GLOBAL: RwLock<Option<StreamRegistry>> = RwLock::new(None);

/// Install the process-wide registry, shutting down any previous one.
pub fn init(registry: StreamRegistry) {
    let previous = GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(registry);
    if let Some(previous) = previous {
        previous.shutdown();
    }
}

pub fn global() -> Option<StreamRegistry> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Remove the process-wide registry and cancel all of its sessions.
pub fn reset() {
    let previous = GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(previous) = previous {
        previous.shutdown();
    }
}
