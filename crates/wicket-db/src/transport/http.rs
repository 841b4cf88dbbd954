//! HTTP SQL endpoint transport for serverless Postgres.
//!
//! Each statement is one `POST` carrying `{"query", "params"}`; a
//! transaction is one `POST` carrying `{"queries": [...]}`, which the
//! endpoint runs inside a single Postgres transaction. The Postgres
//! connection string travels in a header on every request, so nothing is
//! held open between calls.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{QueryResponse, Row, Statement, Transport, TransportError};

const CONNECTION_STRING_HEADER: &str = "Neon-Connection-String";
const RAW_TEXT_HEADER: &str = "Neon-Raw-Text-Output";
const ARRAY_MODE_HEADER: &str = "Neon-Array-Mode";
const ISOLATION_HEADER: &str = "Neon-Batch-Isolation-Level";

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    params: Vec<serde_json::Value>,
}

impl<'a> From<&'a Statement> for QueryBody<'a> {
    fn from(statement: &'a Statement) -> Self {
        Self {
            query: &statement.sql,
            params: statement.params.iter().map(|v| v.to_param()).collect(),
        }
    }
}

#[derive(Serialize)]
struct BatchBody<'a> {
    queries: Vec<QueryBody<'a>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultBody {
    #[serde(default)]
    rows: Vec<Row>,
    #[serde(default)]
    row_count: Option<u64>,
}

impl From<ResultBody> for QueryResponse {
    fn from(body: ResultBody) -> Self {
        let row_count = body.row_count.unwrap_or(body.rows.len() as u64);
        Self {
            rows: body.rows,
            row_count,
        }
    }
}

#[derive(Deserialize)]
struct BatchResultBody {
    results: Vec<ResultBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Transport that speaks the serverless Postgres HTTP protocol.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    connection_string: String,
    timeout: Duration,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("connection_string", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpTransport {
    /// Builds a transport for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the client cannot be built (for
    /// example, when no TLS backend is available).
    pub fn new(
        endpoint: String,
        connection_string: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            connection_string,
            timeout,
        })
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Network(err)
        }
    }

    async fn post<B, R>(&self, body: &B, batch: bool) -> Result<R, TransportError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONNECTION_STRING_HEADER, &self.connection_string)
            .header(RAW_TEXT_HEADER, "true")
            .header(ARRAY_MODE_HEADER, "false")
            .json(body);
        if batch {
            request = request.header(ISOLATION_HEADER, "Serializable");
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_slice::<ErrorBody>(&bytes) {
                return Err(TransportError::Database {
                    code: error.code,
                    message: error.message,
                });
            }
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| TransportError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn query(&self, statement: &Statement) -> Result<QueryResponse, TransportError> {
        let body: ResultBody = self.post(&QueryBody::from(statement), false).await?;
        Ok(body.into())
    }

    async fn transaction(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<QueryResponse>, TransportError> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let body = BatchBody {
            queries: statements.iter().map(QueryBody::from).collect(),
        };
        let result: BatchResultBody = self.post(&body, true).await?;

        if result.results.len() != statements.len() {
            return Err(TransportError::Protocol(format!(
                "expected {} results, got {}",
                statements.len(),
                result.results.len()
            )));
        }

        Ok(result.results.into_iter().map(Into::into).collect())
    }
}
