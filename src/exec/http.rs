//! HTTP transport
//!
//! Issues `GET <url>?q=<query>` with reqwest. The request runs on a spawned
//! Tokio task so that aborting the execution cancels it; `send` must be
//! called from within a Tokio runtime.

use reqwest::Client;
use std::time::Duration;

use crate::decoder::RawResponse;
use crate::exec::{ExecRequest, InFlight, Transport};
use crate::query::{QueryError, QueryResult, TransportError};

/// reqwest-backed [`Transport`]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with a request timeout
    pub fn new(timeout: Duration) -> QueryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Transport(Box::new(e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ExecRequest) -> InFlight {
        let handle = tokio::spawn(fetch(self.client.clone(), request));
        let abort = handle.abort_handle();

        InFlight::new(async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(Box::new(e) as TransportError),
            }
        })
        .with_abort(move || abort.abort())
    }
}

async fn fetch(client: Client, request: ExecRequest) -> Result<RawResponse, TransportError> {
    let mut builder = client
        .get(&request.url)
        .query(&[("q", request.query.as_str())]);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder.send().await?.error_for_status()?;
    Ok(response.json::<RawResponse>().await?)
}
