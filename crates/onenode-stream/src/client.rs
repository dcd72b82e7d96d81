//! Request issuer for streamed agent queries.
//!
//! [`StreamClient::issue`] builds one JSON POST, hands back a
//! [`CancelHandle`] before anything touches the network, and classifies the
//! settled response:
//!
//! | Status | Outcome |
//! |---|---|
//! | 205 | `Ok(Signal(205))`, body drained and dropped |
//! | other 2xx | `Ok(Live(..))` wrapping the body stream |
//! | anything else | `Err(Http { status, detail })` |
//!
//! Transport failures, cancellation, and timeouts are errors too. Every
//! failure is logged where it happens and then returned; nothing is retried.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use onenode_core::{ClientConfig, ConfigError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::body::ResponseBody;
use crate::cancel::CancelHandle;
use crate::decode;
use crate::{StreamError, StreamResult};

/// Detail reported when an error body is JSON but names no reason.
const UNKNOWN_DETAIL: &str = "unknown error";

pub(crate) type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// The not-yet-settled outcome of [`StreamClient::issue`].
pub type Pending = Pin<Box<dyn Future<Output = StreamResult<ResponseOutcome>> + Send>>;

/// One streamed query.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub endpoint: String,
    pub token: Option<String>,
    pub body: Value,
}

impl StreamRequest {
    pub fn new(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            body,
        }
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }
}

/// How a request settled, when it did not fail.
#[derive(Debug)]
pub enum ResponseOutcome {
    /// A 2xx response whose body is ready to stream.
    Live(LiveResponse),
    /// The server answered 205: nothing to stream, and not an error.
    Signal(StatusCode),
}

impl ResponseOutcome {
    pub fn into_live(self) -> Option<LiveResponse> {
        match self {
            ResponseOutcome::Live(live) => Some(live),
            ResponseOutcome::Signal(_) => None,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, ResponseOutcome::Signal(_))
    }
}

/// A successful response with an unread body.
#[derive(Debug)]
pub struct LiveResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl LiveResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_mut(&mut self) -> &mut ResponseBody {
        &mut self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Decode the body line by line. See [`decode::decode_lines`].
    pub async fn decode_lines<F>(&mut self, on_line: F) -> StreamResult<()>
    where
        F: FnMut(&str),
    {
        decode::decode_lines(&mut self.body, on_line).await
    }
}

/// HTTP client for the agent and backend services.
#[derive(Clone)]
pub struct StreamClient {
    pub(crate) http: HttpClient,
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) timeout: Option<Duration>,
}

impl StreamClient {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let timeout = config.timeout()?;
        let http = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            http,
            config: Arc::new(config),
            timeout,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stream a multi-agent query from `{agent_base_url}/query`.
    pub fn query_multi_agent(&self, token: Option<&str>, payload: Value) -> (Pending, CancelHandle) {
        let request = StreamRequest::new(self.config.agent_url("/query"), payload).with_token(token);
        self.issue(request)
    }

    /// Issue `request` and return its pending outcome plus a cancel handle.
    ///
    /// The handle is live before the request is sent. Cancelling while the
    /// outcome is pending resolves it to [`StreamError::Cancelled`] and
    /// drops the in-flight request. Cancelling afterwards does nothing to a
    /// response that was already delivered.
    pub fn issue(&self, request: StreamRequest) -> (Pending, CancelHandle) {
        let cancel = CancelHandle::new();
        let cancelled = cancel.cancelled();

        let built = self.build_request(
            Method::POST,
            &request.endpoint,
            request.token.as_deref(),
            Some(&request.body),
        );
        let http = self.http.clone();
        let timeout = self.timeout;
        let endpoint = request.endpoint;

        let pending = async move {
            let result = match built {
                Ok(req) => {
                    debug!(%endpoint, "issuing stream request");
                    tokio::select! {
                        biased;
                        _ = cancelled => Err(StreamError::Cancelled),
                        outcome = with_timeout(timeout, attempt(http, req)) => outcome,
                    }
                }
                Err(e) => Err(e),
            };

            match &result {
                Ok(ResponseOutcome::Live(live)) => {
                    debug!(%endpoint, status = %live.status, "stream response live");
                }
                Ok(ResponseOutcome::Signal(status)) => {
                    info!(%endpoint, %status, "stream request answered with reset signal");
                }
                Err(e) => warn!(%endpoint, error = %e, "stream request failed"),
            }
            result
        };

        (Box::pin(pending), cancel)
    }

    pub(crate) fn build_request(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> StreamResult<Request<Full<Bytes>>> {
        let uri: http::Uri = url
            .parse()
            .map_err(|e| StreamError::InvalidRequest(format!("{url}: {e}")))?;

        let payload = match body {
            Some(value) => Bytes::from(serde_json::to_vec(value).map_err(StreamError::Serialize)?),
            None => Bytes::new(),
        };

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, self.config.user_agent.as_str());

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        builder
            .body(Full::new(payload))
            .map_err(|e| StreamError::InvalidRequest(e.to_string()))
    }
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("agent_base_url", &self.config.agent_base_url)
            .field("backend_base_url", &self.config.backend_base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Send the request and classify the response.
async fn attempt(http: HttpClient, req: Request<Full<Bytes>>) -> StreamResult<ResponseOutcome> {
    let response = send(&http, req).await?;
    let status = response.status();

    if status == StatusCode::RESET_CONTENT {
        // 205 carries no content; discard whatever arrived.
        if let Err(e) = response.into_body().collect().await {
            debug!(error = %e, %status, "failed to drain reset response body");
        }
        return Ok(ResponseOutcome::Signal(status));
    }

    if status.is_success() {
        let (parts, body) = response.into_parts();
        return Ok(ResponseOutcome::Live(LiveResponse {
            status,
            headers: parts.headers,
            body: ResponseBody::from_incoming(body),
        }));
    }

    Err(http_error(status, response.into_body()).await)
}

pub(crate) async fn send(
    http: &HttpClient,
    req: Request<Full<Bytes>>,
) -> StreamResult<Response<Incoming>> {
    http.request(req)
        .await
        .map_err(|e| StreamError::Transport(error_chain(&e)))
}

pub(crate) async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = StreamResult<T>>,
) -> StreamResult<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StreamError::Timeout(limit))?,
        None => fut.await,
    }
}

/// Build the error for a rejected request from its body.
pub(crate) async fn http_error(status: StatusCode, body: Incoming) -> StreamError {
    let detail = match body.collect().await {
        Ok(collected) => error_detail(&collected.to_bytes()),
        Err(e) => {
            debug!(error = %e, %status, "failed to read error body");
            String::new()
        }
    };
    StreamError::Http { status, detail }
}

/// Best-effort reason from an error body.
///
/// `{"detail": ...}` yields the detail (strings verbatim, other values as
/// JSON). JSON without a detail yields a generic reason. Anything that is
/// not JSON is returned as text.
pub(crate) fn error_detail(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(json) => match json.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(Value::Null) | None => UNKNOWN_DETAIL.to_string(),
            Some(other) => other.to_string(),
        },
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
