//! Query Execution
//!
//! [`Query::exec`] renders an execution copy of the query, hands it to a
//! [`Transport`] and returns an [`Execution`]: a future that decodes the raw
//! response once the transport settles, plus an abort handle.
//!
//! # Execution Pipeline
//!
//! ```text
//! Query → prefix parts by index → (split into v/c channels) → render
//!       → Transport::send → RawResponse → Decoder → DecodedResponse
//! ```
//!
//! Transports are pluggable. [`http::HttpTransport`] issues the request with
//! reqwest; tests and embedders can pass any closure returning [`InFlight`].

pub mod http;

use futures_util::future::BoxFuture;
use futures_util::{ready, FutureExt};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

use crate::decoder::{Confidence, DecodedResponse, Decoder, RawResponse};
use crate::query::{Part, Query, QueryError, QueryResult, TransportError};

/// Endpoint used when none is configured
pub const DEFAULT_URL: &str = "http://localhost:8080";

/// Content type requested when no `accept` header is given
pub const DEFAULT_ACCEPT: &str = "application/json";

/// Function applied to the confidence copy of each part
pub const CONFIDENCE_FN: &str = "confidence";

/// Request handed to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Endpoint URL
    pub url: String,
    /// Rendered query text, sent as the `q` parameter
    pub query: String,
    /// Request headers
    pub headers: BTreeMap<String, String>,
}

/// Execution options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Endpoint URL; [`DEFAULT_URL`] if unset
    pub url: Option<String>,
    /// Extra headers; `accept` defaults to [`DEFAULT_ACCEPT`]
    pub headers: BTreeMap<String, String>,
    /// Request and apply confidence channels
    pub apply_confidence: Confidence,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn apply_confidence(mut self, confidence: Confidence) -> Self {
        self.apply_confidence = confidence;
        self
    }

    /// Build the transport request for rendered `query` text
    /// URL the request is sent to
    pub fn endpoint(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_URL)
    }

    pub fn request(&self, query: String) -> ExecRequest {
        let mut headers = self.headers.clone();
        if !headers.keys().any(|k| k.eq_ignore_ascii_case("accept")) {
            headers.insert("accept".to_string(), DEFAULT_ACCEPT.to_string());
        }

        ExecRequest {
            url: self.endpoint().to_string(),
            query,
            headers,
        }
    }
}

type AbortFn = Arc<dyn Fn() + Send + Sync>;

/// A request in flight: the pending response and an optional canceller
pub struct InFlight {
    response: BoxFuture<'static, Result<RawResponse, TransportError>>,
    abort: Option<AbortFn>,
}

impl InFlight {
    pub fn new<F>(response: F) -> Self
    where
        F: Future<Output = Result<RawResponse, TransportError>> + Send + 'static,
    {
        Self {
            response: response.boxed(),
            abort: None,
        }
    }

    /// Attach the transport's cancellation
    pub fn with_abort<A>(mut self, abort: A) -> Self
    where
        A: Fn() + Send + Sync + 'static,
    {
        self.abort = Some(Arc::new(abort));
        self
    }

    pub fn is_abortable(&self) -> bool {
        self.abort.is_some()
    }
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("abortable", &self.is_abortable())
            .finish()
    }
}

/// Sends rendered queries to a DalmatinerDB endpoint
pub trait Transport {
    fn send(&self, request: ExecRequest) -> InFlight;
}

impl<F> Transport for F
where
    F: Fn(ExecRequest) -> InFlight,
{
    fn send(&self, request: ExecRequest) -> InFlight {
        self(request)
    }
}

/// A running query
///
/// Resolves to the decoded response. Transport failures surface as
/// [`QueryError::Transport`] unchanged.
pub struct Execution {
    query: String,
    response: BoxFuture<'static, Result<RawResponse, TransportError>>,
    abort: AbortFn,
    decoder: Decoder,
}

impl Execution {
    /// Query text that was sent
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Cancel the request through the transport
    pub fn abort(&self) {
        debug!(query = %self.query, "Aborting query");
        (self.abort)();
    }

    /// Handle that can cancel the request after the execution is moved
    pub fn abort_handle(&self) -> impl Fn() + Send + Sync + 'static {
        let abort = self.abort.clone();
        move || abort()
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("query", &self.query)
            .field("decoder", &self.decoder)
            .finish()
    }
}

impl Future for Execution {
    type Output = QueryResult<DecodedResponse>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(self.response.poll_unpin(cx));
        Poll::Ready(match result {
            Ok(raw) => self.decoder.decode(&raw),
            Err(e) => Err(QueryError::Transport(e)),
        })
    }
}

impl Query {
    /// Execute through `transport`
    ///
    /// Every part is prefixed with its index so series can be traced back
    /// to it. With confidence enabled each part is sent twice: as a value
    /// channel (`'i'.'v'`) and wrapped in `confidence(...)` (`'i'.'c'`).
    /// Fails with [`QueryError::NotAbortable`] if the transport offers no
    /// cancellation.
    pub fn exec<T>(&self, transport: &T, options: ExecOptions) -> QueryResult<Execution>
    where
        T: Transport + ?Sized,
    {
        let query = self.prepare_exec(options.apply_confidence).render()?;
        let request = options.request(query.clone());
        debug!(url = %request.url, query = %query, "Executing query");

        let in_flight = transport.send(request);
        let abort = in_flight.abort.ok_or(QueryError::NotAbortable)?;

        Ok(Execution {
            query,
            response: in_flight.response,
            abort,
            decoder: Decoder::for_query(self, options.apply_confidence),
        })
    }

    /// The query as sent by [`exec`](Self::exec)
    pub fn prepare_exec(&self, confidence: Confidence) -> Query {
        let prefixed = self
            .parts()
            .iter()
            .enumerate()
            .map(|(i, part)| (i.to_string(), part));

        let parts: Vec<Part> = if confidence.is_enabled() {
            prefixed
                .flat_map(|(i, part)| {
                    let value = part.prefix_with([i.clone(), "v".to_string()]);
                    let mut conf = part
                        .prefix_with([i, "c".to_string()])
                        .apply(CONFIDENCE_FN, vec![]);
                    // `$name` keeps resolving to the value channel
                    conf.name = None;
                    [value, conf]
                })
                .collect()
        } else {
            prefixed.map(|(i, part)| part.prefix_with([i])).collect()
        };

        self.with_parts(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RawSeries;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn query() -> Query {
        Query::new()
            .from("some-org")
            .select(["base", "cpu"])
            .unwrap()
            .last(Duration::minutes(10))
            .into_query()
    }

    #[test]
    fn test_request_defaults() {
        let request = ExecOptions::new().request("SELECT x".to_string());
        assert_eq!(request.url, DEFAULT_URL);
        assert_eq!(ExecOptions::new().url("http://db:8080").endpoint(), "http://db:8080");
        assert_eq!(request.headers.get("accept").unwrap(), DEFAULT_ACCEPT);
    }

    #[test]
    fn test_request_keeps_explicit_accept() {
        let request = ExecOptions::new()
            .url("http://db:8080")
            .header("Accept", "application/x-msgpack")
            .request("SELECT x".to_string());
        assert_eq!(request.url, "http://db:8080");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers.get("Accept").unwrap(), "application/x-msgpack");
    }

    #[test]
    fn test_prepare_prefixes_by_index() {
        let q = query().prepare_exec(Confidence::Off);
        assert_eq!(
            q.render().unwrap(),
            "SELECT 'base'.'cpu' FROM 'some-org' AS '0' LAST 600s"
        );
    }

    #[test]
    fn test_prepare_with_confidence_keeps_names_on_value_channel() {
        let q = query()
            .at(0)
            .unwrap()
            .name_by("cpu")
            .into_query()
            .prepare_exec(Confidence::On);
        assert_eq!(q.parts().len(), 2);
        assert_eq!(q.parts()[0].name.as_deref(), Some("cpu"));
        assert_eq!(q.parts()[1].name, None);
    }

    #[test]
    fn test_not_abortable_transport_fails_fast() {
        let transport = |_: ExecRequest| InFlight::new(async { Ok(RawResponse { s: 0, d: vec![] }) });
        let err = query().exec(&transport, ExecOptions::new()).unwrap_err();
        assert!(matches!(err, QueryError::NotAbortable));
    }

    #[tokio::test]
    async fn test_exec_decodes_response() {
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let transport = move |request: ExecRequest| {
            *captured.lock().unwrap() = Some(request);
            InFlight::new(async {
                Ok(RawResponse {
                    s: 1,
                    d: vec![RawSeries {
                        n: "'0'".to_string(),
                        r: 1000,
                        v: vec![1.0, 2.0],
                    }],
                })
            })
            .with_abort(|| {})
        };

        let execution = query().exec(&transport, ExecOptions::new()).unwrap();
        let decoded = execution.await.unwrap();

        let request = seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.query, "SELECT 'base'.'cpu' FROM 'some-org' AS '0' LAST 600s");
        assert_eq!(decoded.series[0].points, vec![(1.0, 1000), (2.0, 2000)]);
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let transport = |_: ExecRequest| {
            InFlight::new(async { Err::<RawResponse, TransportError>("connection refused".into()) })
                .with_abort(|| {})
        };
        let err = query()
            .exec(&transport, ExecOptions::new())
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Transport(e) if e.to_string() == "connection refused"));
    }

    #[test]
    fn test_abort_delegates_to_transport() {
        let aborted = Arc::new(AtomicBool::new(false));
        let flag = aborted.clone();
        let transport = move |_: ExecRequest| {
            let flag = flag.clone();
            InFlight::new(futures_util::future::pending())
                .with_abort(move || flag.store(true, Ordering::SeqCst))
        };

        let execution = query().exec(&transport, ExecOptions::new()).unwrap();
        execution.abort();
        assert!(aborted.load(Ordering::SeqCst));
    }
}
