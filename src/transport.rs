//! This module is about sending the outbound HTTP requests required to talk to [Warcraft Logs](https://www.warcraftlogs.com/api/docs).
//!
//! Everything else in the crate only sees the [Transport] trait, so tests can swap [reqwest] out for a scripted fake.

use async_trait::async_trait;
use std::time::Duration;

/// How a request should authenticate itself to the remote end.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestAuth {
    /// HTTP Basic authentication.
    Basic { username: String, password: String },
    /// An `Authorization: Bearer` header.
    Bearer(String),
}

/// The payload of a request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` key-value pairs.
    Form(Vec<(String, String)>),
    /// An `application/json` document.
    Json(serde_json::Value),
}

/// An outbound `POST` request.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub auth: RequestAuth,
    pub body: RequestBody,
    pub timeout: Duration,
}

/// The response to an [HttpRequest], with the body left unparsed.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status code is in the `2xx` range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response: connection refused, timeout, DNS failure and the like.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// The capability of sending a request and getting back a response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [Transport] backed by a shared [reqwest::Client].
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        trace!("Building request to {}...", &request.url);
        let mut builder = self.client.post(&request.url).timeout(request.timeout);
        builder = match request.auth {
            RequestAuth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            RequestAuth::Bearer(token) => builder.bearer_auth(token),
        };
        builder = match request.body {
            RequestBody::Form(pairs) => builder.form(&pairs),
            RequestBody::Json(value) => builder.json(&value),
        };

        trace!("Posting request...");
        let resp = builder.send().await.map_err(|e| TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        trace!("Received status {status}, reading body...");
        let body = resp.bytes().await.map_err(|e| TransportError(e.to_string()))?;

        Ok(HttpResponse { status, body: body.to_vec() })
    }
}
