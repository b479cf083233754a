// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of closed batches to the index backend.
//!
//! [`BulkTransport`] is the seam between the sink and the backend. The
//! production implementation, [`ElasticsearchTransport`], POSTs the batch to
//! the `_bulk` endpoint and classifies the outcome:
//!
//! | response                                 | outcome                          |
//! |------------------------------------------|----------------------------------|
//! | network error, 429, 5xx                  | `TransportError::Transient`      |
//! | other non-2xx                            | `TransportError::Permanent`      |
//! | 2xx, `errors: false` or empty body       | `BulkOutcome::Accepted`          |
//! | 2xx, only 429 item failures              | `BulkOutcome::PartiallyRejected` |
//! | 2xx, any other item failure              | `TransportError::Permanent`      |
//! | 2xx, unparseable body                    | `TransportError::Permanent`      |

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::TransportError;
use crate::http::get_client;
use crate::sink::batch::Batch;

/// Result of a bulk request the backend answered successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    /// Every document was indexed.
    Accepted,
    /// The documents at these batch positions were throttled and should be
    /// sent again; the rest were indexed.
    PartiallyRejected { retryable: Vec<usize> },
}

#[async_trait]
pub trait BulkTransport: Send + Sync + 'static {
    async fn send(&self, batch: &Batch) -> Result<BulkOutcome, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ElasticsearchTransport {
    client: reqwest::Client,
    bulk_url: String,
    headers: HeaderMap,
}

impl ElasticsearchTransport {
    /// Creates a transport for the backend at `base_url`
    /// (e.g. `http://localhost:9200`).
    #[must_use]
    pub fn new(base_url: &str, https_proxy: Option<&str>, request_timeout: Duration) -> Self {
        let client = get_client(https_proxy, request_timeout);
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));
        ElasticsearchTransport {
            client,
            bulk_url: format!("{}/_bulk", base_url.trim_end_matches('/')),
            headers,
        }
    }

    pub fn bulk_url(&self) -> &str {
        &self.bulk_url
    }
}

#[async_trait]
impl BulkTransport for ElasticsearchTransport {
    async fn send(&self, batch: &Batch) -> Result<BulkOutcome, TransportError> {
        let time = Instant::now();
        let response = self
            .client
            .post(&self.bulk_url)
            .headers(self.headers.clone())
            .body(batch.body())
            .send()
            .await
            .map_err(|e| TransportError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Transient(format!("failed to read response: {e}")))?;
        debug!(
            "SINK | Bulk request of {} documents answered {} in {} ms",
            batch.len(),
            status,
            time.elapsed().as_millis()
        );

        interpret_bulk_response(status, &body)
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Classifies a bulk response. See the module documentation for the rules.
pub fn interpret_bulk_response(status: StatusCode, body: &[u8]) -> Result<BulkOutcome, TransportError> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(TransportError::Transient(format!(
            "{status}: {}",
            String::from_utf8_lossy(body)
        )));
    }
    if !status.is_success() {
        return Err(TransportError::Permanent(format!(
            "{status}: {}",
            String::from_utf8_lossy(body)
        )));
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(BulkOutcome::Accepted);
    }

    let response: BulkResponse = serde_json::from_slice(body)
        .map_err(|e| TransportError::Permanent(format!("malformed bulk response: {e}")))?;
    if !response.errors {
        return Ok(BulkOutcome::Accepted);
    }

    let mut retryable = Vec::new();
    let mut failed = 0;
    let mut first_failure = None;
    for (position, item) in response.items.iter().enumerate() {
        let Some(result) = item.values().next() else {
            continue;
        };
        if result.status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
            retryable.push(position);
        } else if !(200..300).contains(&result.status) {
            failed += 1;
            if first_failure.is_none() {
                first_failure = Some(format!(
                    "{} {}",
                    result.status,
                    result.error.as_ref().map(ToString::to_string).unwrap_or_default()
                ));
            }
        }
    }

    if failed > 0 {
        return Err(TransportError::Permanent(format!(
            "{failed} documents rejected, first: {}",
            first_failure.unwrap_or_default()
        )));
    }
    if retryable.is_empty() {
        return Ok(BulkOutcome::Accepted);
    }
    Ok(BulkOutcome::PartiallyRejected { retryable })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCEPTED: &str = r#"{"took":3,"errors":false,"items":[{"index":{"_index":"logs","_id":"a","status":201}}]}"#;

    #[test]
    fn test_accepted() {
        assert_eq!(
            interpret_bulk_response(StatusCode::OK, ACCEPTED.as_bytes()),
            Ok(BulkOutcome::Accepted)
        );
        assert_eq!(interpret_bulk_response(StatusCode::OK, b""), Ok(BulkOutcome::Accepted));
    }

    #[test]
    fn test_throttled_and_server_errors_are_transient() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(matches!(
                interpret_bulk_response(status, b"busy"),
                Err(TransportError::Transient(_))
            ));
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED, StatusCode::NOT_FOUND] {
            assert!(matches!(
                interpret_bulk_response(status, b"nope"),
                Err(TransportError::Permanent(_))
            ));
        }
    }

    #[test]
    fn test_malformed_body_is_permanent() {
        assert!(matches!(
            interpret_bulk_response(StatusCode::OK, b"<html>proxy</html>"),
            Err(TransportError::Permanent(_))
        ));
    }

    #[test]
    fn test_throttled_items_are_retryable() {
        let body = r#"{"errors":true,"items":[
            {"index":{"status":201}},
            {"index":{"status":429,"error":{"type":"es_rejected_execution_exception"}}},
            {"index":{"status":201}},
            {"index":{"status":429,"error":{"type":"es_rejected_execution_exception"}}}
        ]}"#;
        assert_eq!(
            interpret_bulk_response(StatusCode::OK, body.as_bytes()),
            Ok(BulkOutcome::PartiallyRejected {
                retryable: vec![1, 3]
            })
        );
    }

    #[test]
    fn test_rejected_items_are_permanent() {
        let body = r#"{"errors":true,"items":[
            {"index":{"status":429}},
            {"index":{"status":400,"error":{"type":"mapper_parsing_exception","reason":"failed to parse field [log-ts]"}}}
        ]}"#;
        let err = interpret_bulk_response(StatusCode::OK, body.as_bytes()).unwrap_err();
        let TransportError::Permanent(message) = err else {
            panic!("expected a permanent error");
        };
        assert!(message.contains("1 documents rejected"));
        assert!(message.contains("mapper_parsing_exception"));
    }

    #[test]
    fn test_bulk_url() {
        let transport = ElasticsearchTransport::with_client(reqwest::Client::new(), "http://localhost:9200/");
        assert_eq!(transport.bulk_url(), "http://localhost:9200/_bulk");
    }
}
