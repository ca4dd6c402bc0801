//! HTTP client for the Banquet query server.
//!
//! `QueryClient` posts a Banquet URL to `/query` and drives the streamed
//! NDJSON body into a [`StreamConsumer`]. Each chunk is fed as soon as it
//! arrives, so sinks see rows long before the response is complete.
//!
//! Queries usually run on their own task via [`QueryClient::spawn_query`],
//! which forwards events to the UI over a channel and returns a
//! [`QueryHandle`] for cancellation.

use std::sync::mpsc::Sender;

use futures::StreamExt;
use reqwest::{RequestBuilder, StatusCode};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::models::{ColumnInfo, QueryRequest, SchemaResponse};
use crate::stream::{ChannelSink, QueryUpdate, StreamConsumer, StreamOutcome, StreamSink};

/// Client-side error types for the non-streaming endpoints and setup.
///
/// Streaming queries never return these; failures there become error
/// events on the sink.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server URL or an endpoint derived from it is unusable.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status and no error message.
    #[error("Server returned HTTP {0}")]
    Status(StatusCode),

    /// Server answered with an explicit error message.
    #[error("Server error: {0}")]
    Server(String),
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

/// Render an error with its source chain, e.g.
/// `error sending request: connection refused`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Client for one query server.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    base_url: Url,
    max_line_len: usize,
}

impl QueryClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if the server URL cannot carry
    /// paths, or `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let mut base_url = config.server_url.clone();
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }
        // Endpoints are joined relative to the base, which needs a trailing slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            max_line_len: config.max_line_len,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    /// Check that the server is up (`GET /health`).
    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self.http.get(self.endpoint("health")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        Ok(())
    }

    /// Fetch the schema of one table (`GET /schema/{table}?db={path}`).
    pub async fn fetch_schema(
        &self,
        db_path: &str,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, ClientError> {
        let mut url = self.endpoint("schema/")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(table);
        url.query_pairs_mut().append_pair("db", db_path);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        match serde_json::from_slice::<SchemaResponse>(&body) {
            Ok(SchemaResponse {
                error: Some(message),
                ..
            }) if !message.is_empty() => Err(ClientError::Server(message)),
            Ok(schema) if status.is_success() => Ok(schema.columns.unwrap_or_default()),
            Ok(_) => Err(ClientError::Status(status)),
            Err(e) if status.is_success() => Err(ClientError::Server(format!(
                "Malformed schema response: {}",
                e
            ))),
            Err(_) => Err(ClientError::Status(status)),
        }
    }

    /// Build the `POST /query` request for a Banquet URL.
    pub fn build_query_request(&self, banquet_url: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self
            .http
            .post(self.endpoint("query")?)
            .json(&QueryRequest::new(banquet_url)))
    }

    fn new_consumer<S: StreamSink>(&self, sink: S) -> StreamConsumer<S> {
        StreamConsumer::with_max_line_len(sink, self.max_line_len)
    }

    /// Send a ready-made request and stream its body into `sink`.
    ///
    /// Returns the consumer once the stream reached an outcome, so callers
    /// can inspect the outcome, stats and sink. Transport errors become a
    /// single error event; cancelling `cancel` drops the connection and
    /// suppresses any further events.
    ///
    /// A non-success status is not a transport failure: the body is still
    /// streamed (the server puts its error record there) and the stream
    /// completes. If the body carried no error record, the status itself is
    /// reported as a record-level error before completion.
    pub async fn consume<S: StreamSink>(
        &self,
        request: RequestBuilder,
        sink: S,
        cancel: &CancellationToken,
    ) -> StreamConsumer<S> {
        let mut consumer = self.new_consumer(sink);

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                consumer.cancel();
                return consumer;
            }
            sent = request.send() => sent,
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                consumer.fail(error_chain(&e));
                return consumer;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("Query returned HTTP {}", status);
        }

        let body = response.bytes_stream();
        futures::pin_mut!(body);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    consumer.cancel();
                    break;
                }
                next = body.next() => match next {
                    Some(Ok(chunk)) => {
                        consumer.feed(&chunk);
                        if consumer.is_terminated() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        consumer.fail(error_chain(&e));
                        break;
                    }
                    None => {
                        if !status.is_success() && consumer.stats().error_records == 0 {
                            consumer.report_error(ClientError::Status(status).to_string());
                        }
                        consumer.finish();
                        break;
                    }
                },
            }
        }

        consumer
    }

    /// Run one query to its outcome, streaming events into `sink`.
    pub async fn stream_query<S: StreamSink>(
        &self,
        banquet_url: &str,
        sink: S,
        cancel: &CancellationToken,
    ) -> StreamConsumer<S> {
        match self.build_query_request(banquet_url) {
            Ok(request) => self.consume(request, sink, cancel).await,
            Err(e) => {
                let mut consumer = self.new_consumer(sink);
                consumer.fail(e.to_string());
                consumer
            }
        }
    }

    /// Start a query on `runtime`, forwarding events tagged with `query_id`.
    pub fn spawn_query(
        &self,
        runtime: &Handle,
        query_id: usize,
        banquet_url: String,
        tx: Sender<QueryUpdate>,
    ) -> QueryHandle {
        let cancel = CancellationToken::new();
        let client = self.clone();
        let token = cancel.clone();

        let task = runtime.spawn(async move {
            info!(query_id, "Starting query: {}", banquet_url);
            let sink = ChannelSink::new(query_id, tx);
            let consumer = client.stream_query(&banquet_url, sink, &token).await;
            let outcome = consumer.outcome();
            info!(query_id, ?outcome, stats = ?consumer.stats(), "Query finished");
            outcome
        });

        QueryHandle {
            query_id,
            cancel,
            task,
        }
    }
}

/// Handle to a running query task.
///
/// Dropping the handle cancels the query.
pub struct QueryHandle {
    query_id: usize,
    cancel: CancellationToken,
    task: JoinHandle<Option<StreamOutcome>>,
}

impl QueryHandle {
    pub fn query_id(&self) -> usize {
        self.query_id
    }

    /// Cancel the query; no further events will be sent for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the query task and return its outcome.
    ///
    /// Returns `None` if the task panicked or was aborted.
    pub async fn join(mut self) -> Option<StreamOutcome> {
        (&mut self.task).await.ok().flatten()
    }
}

impl Drop for QueryHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
