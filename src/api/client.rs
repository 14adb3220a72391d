use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{
    HumanResponse, RunRequest, RunResponse, StreamRequest, Thread, ThreadDetail, ThreadStatus,
};
use crate::endpoint::{is_local, is_local_url, parse_api_url};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Opens the event stream of one run. The registry only talks to this seam.
pub trait StreamSource: Send + Sync {
    fn open(&self, request: StreamRequest) -> BoxFuture<'static, Result<ByteStream>>;
}

/// Non-streaming thread endpoints.
pub trait InboxApi: StreamSource {
    fn list_threads(&self, status: Option<ThreadStatus>) -> BoxFuture<'_, Result<Vec<Thread>>>;

    fn get_thread<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<ThreadDetail>>;

    fn resume_thread<'a>(
        &'a self,
        thread_id: &'a str,
        response: &'a HumanResponse,
    ) -> BoxFuture<'a, Result<RunResponse>>;

    fn delete_thread<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    thread_list_limit: u32,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = parse_api_url(&config.api_url)?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            thread_list_limit: config.thread_list_limit,
        })
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local(&self.base_url)
    }

    pub async fn create_stream(&self, request: &StreamRequest) -> Result<ByteStream> {
        let (url, payload) = match request {
            StreamRequest::Start {
                thread_id,
                question,
            } => (
                self.endpoint(&["runs", "stream"])?,
                serde_json::to_value(RunRequest {
                    thread_id: thread_id.clone(),
                    question: question.clone(),
                })?,
            ),
            StreamRequest::Resume {
                thread_id,
                response,
            } => (
                self.endpoint(&["threads", thread_id.as_str(), "resume", "stream"])?,
                serde_json::to_value(response)?,
            ),
        };

        if debug_payload_enabled() {
            emit_debug_payload(url.as_str(), &payload);
        }

        let request_url = url.to_string();
        let response = self
            .authorize(self.http.post(url))
            .header("accept", "text/event-stream")
            .json(&payload)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url))
        });
        Ok(Box::pin(stream))
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        let url = self.endpoint(&["health"])?;
        self.get_json(url).await
    }

    async fn fetch_threads(&self, status: Option<ThreadStatus>) -> Result<Vec<Thread>> {
        let mut url = self.endpoint(&["threads"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.thread_list_limit.to_string());
            if let Some(status) = status {
                query.append_pair("status", status.as_str());
            }
        }
        self.get_json(url).await
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadDetail> {
        let url = self.endpoint(&["threads", thread_id])?;
        self.get_json(url).await
    }

    async fn post_resume(&self, thread_id: &str, response: &HumanResponse) -> Result<RunResponse> {
        let url = self.endpoint(&["threads", thread_id, "resume"])?;
        let payload = serde_json::to_value(response)?;
        if debug_payload_enabled() {
            emit_debug_payload(url.as_str(), &payload);
        }
        let request_url = url.to_string();
        let response = self
            .authorize(self.http.post(url))
            .json(&payload)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        response
            .json::<RunResponse>()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))
    }

    async fn send_delete(&self, thread_id: &str) -> Result<()> {
        let url = self.endpoint(&["threads", thread_id])?;
        let request_url = url.to_string();
        let response = self
            .authorize(self.http.delete(url))
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(thread_id, "thread already absent on server");
            return Ok(());
        }
        response
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let request_url = url.to_string();
        self.authorize(self.http.get(url))
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?
            .json::<T>()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) => request.header("authorization", format!("Bearer {api_key}")),
            None => request,
        }
    }

    /// Base URL plus percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("API URL '{}' cannot be used as a base", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl StreamSource for ApiClient {
    fn open(&self, request: StreamRequest) -> BoxFuture<'static, Result<ByteStream>> {
        let client = self.clone();
        async move { client.create_stream(&request).await }.boxed()
    }
}

impl InboxApi for ApiClient {
    fn list_threads(&self, status: Option<ThreadStatus>) -> BoxFuture<'_, Result<Vec<Thread>>> {
        self.fetch_threads(status).boxed()
    }

    fn get_thread<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<ThreadDetail>> {
        self.fetch_thread(thread_id).boxed()
    }

    fn resume_thread<'a>(
        &'a self,
        thread_id: &'a str,
        response: &'a HumanResponse,
    ) -> BoxFuture<'a, Result<RunResponse>> {
        self.post_resume(thread_id, response).boxed()
    }

    fn delete_thread<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<()>> {
        self.send_delete(thread_id).boxed()
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_url(request_url) {
        return anyhow!(
            "cannot reach local inbox API '{}': {}. Start the backend or update INBOX_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach inbox API '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "inbox API '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    if error.is_decode() {
        return anyhow!("unexpected response body from '{}': {}", request_url, error);
    }
    anyhow!("request to '{}' failed: {}", request_url, error)
}
