//! This module is about performing GraphQL requests to [Warcraft Logs](https://www.warcraftlogs.com/api/docs) to fetch data.

use crate::auth::{AuthenticationFailure, TokenManager};
use crate::query::QueryDocument;
use crate::transport::{HttpRequest, RequestAuth, RequestBody, Transport};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// How long a GraphQL request may take before it is abandoned.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// The outcome of a GraphQL request that reached the API: data, protocol errors, or both.
pub type QueryResult = graphql_client::Response<serde_json::Value>;

/// Error enumeration for possible Warcraft Logs errors.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// No token could be obtained.
    #[error(transparent)]
    Authentication(#[from] AuthenticationFailure),
    /// The API could not be reached.
    #[error("WCL Query failed: {0}")]
    Transport(String),
    /// The API answered with an error status, or with something that is not a GraphQL response.
    #[error("WCL Query failed: {message}")]
    Query { status: u16, message: String },
}

/// The parts of an error body that may explain what went wrong.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Option<Vec<ErrorMessage>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Pick the most specific explanation available in an error response.
fn error_message(status: u16, body: &[u8]) -> String {
    let body: Option<ErrorBody> = serde_json::from_slice(body).ok();
    let body = match body {
        Some(body) => body,
        None => return format!("Request failed with status code {status}"),
    };
    if let Some(first) = body.errors.and_then(|errors| errors.into_iter().next()) {
        return first.message
    }
    match body.error {
        Some(serde_json::Value::String(error)) => error,
        Some(serde_json::Value::Null) | None => format!("Request failed with status code {status}"),
        Some(error) => error.to_string(),
    }
}

/// Runs [QueryDocument]s against the GraphQL endpoint, authenticating through a [TokenManager].
pub struct QueryExecutor {
    tokens: Arc<TokenManager>,
    transport: Arc<dyn Transport>,
}

impl QueryExecutor {
    pub fn new(tokens: Arc<TokenManager>, transport: Arc<dyn Transport>) -> Self {
        Self { tokens, transport }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// The GraphQL endpoint queries are posted to.
    pub fn api_url(&self) -> &str {
        &self.tokens.credential().api_url
    }

    /// Execute `document`, returning whatever data and errors the API produced.
    ///
    /// GraphQL errors in a successful response are not failures: they are returned alongside the (possibly partial) data.
    /// A token rejected by the API is reported as [QueryError::Query], without authenticating again.
    pub async fn execute(&self, document: &QueryDocument) -> Result<QueryResult, QueryError> {
        trace!("Getting a valid token...");
        let token = self.tokens.valid_token().await?;

        trace!("Serializing query document...");
        let body = serde_json::to_value(document).map_err(|e| QueryError::Query { status: 500, message: e.to_string() })?;
        let request = HttpRequest {
            url: self.api_url().to_string(),
            auth: RequestAuth::Bearer(token),
            body: RequestBody::Json(body),
            timeout: QUERY_TIMEOUT,
        };

        trace!("Posting query...");
        let resp = self.transport.send(request).await.map_err(|e| QueryError::Transport(e.0))?;

        if !resp.is_success() {
            let message = error_message(resp.status, &resp.body);
            error!("Query rejected with status {}: {}", resp.status, &message);
            return Err(QueryError::Query { status: resp.status, message })
        }

        trace!("Parsing response...");
        let result: QueryResult = serde_json::from_slice(&resp.body)
            .map_err(|e| QueryError::Query { status: 502, message: format!("malformed response body: {e}") })?;

        if let Some(errors) = result.errors.as_ref().filter(|errors| !errors.is_empty()) {
            warn!("GraphQL errors in response: {:#?}", errors);
        }
        trace!("Successfully parsed response!");

        Ok(result)
    }

    /// Whether a valid token can currently be obtained.
    pub async fn test_connection(&self) -> bool {
        match self.tokens.valid_token().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Connection test failed: {e}");
                false
            }
        }
    }
}
