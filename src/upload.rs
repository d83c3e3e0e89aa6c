//! # upload: endpoint seam and orchestration
//!
//! [`UploadEndpoint`] is the transport seam: one operation that posts a
//! prepared multipart body and returns the parsed response. The real
//! implementation is a thin [`reqwest`] wrapper; tests drive the generated
//! mock instead.
//!
//! Orchestration composes the source, monitor and encoder into attempts:
//! a single attempt streams with live progress and catches Ctrl-C into a
//! clean abort, while the N-way fan-out dispatches concurrent attempts
//! without progress and collects their links in submission order.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, error, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::UploadTarget;
use crate::multipart::{MultipartEncoder, DEFAULT_CHUNK_SIZE};
use crate::progress::{ProgressDisplay, ProgressMonitor};
use crate::source::{ByteSource, SharedSource};

/// Field name the remote endpoint expects the file part under.
const FIELD_NAME: &str = "file";

/// Error type for the endpoint seam (boxed, like the other trait seams).
pub type EndpointError = Box<dyn std::error::Error + Send + Sync>;

/// Parsed result of one upload attempt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadResponse {
    /// The share link extracted from the response body.
    pub link: String,
    /// The full response object, for verbose output.
    pub raw: serde_json::Value,
}

/// Minimum contract of the endpoint's JSON response; any other fields ride
/// along untouched in [`UploadResponse::raw`].
#[derive(Debug, serde::Deserialize)]
struct LinkEnvelope {
    link: String,
}

fn parse_response(raw: serde_json::Value) -> Result<UploadResponse, EndpointError> {
    let envelope: LinkEnvelope = serde_json::from_value(raw.clone())
        .map_err(|e| format!("upload response missing 'link' field: {e} (got: {raw})"))?;
    Ok(UploadResponse {
        link: envelope.link,
        raw,
    })
}

/// One-shot transport for a prepared multipart body.
///
/// The trait is annotated for `mockall` so orchestration tests can run
/// against a deterministic fake endpoint.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UploadEndpoint: Send + Sync {
    /// POST the body with the given `Content-Type` and return the parsed
    /// response. Non-success HTTP statuses and malformed bodies are errors.
    async fn send(
        &self,
        content_type: String,
        body: reqwest::Body,
    ) -> Result<UploadResponse, EndpointError>;
}

/// Real endpoint backed by `reqwest`, posting to the configured URL.
pub struct HttpEndpoint {
    client: reqwest::Client,
    target: UploadTarget,
}

impl HttpEndpoint {
    pub fn new(target: UploadTarget) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { client, target })
    }
}

#[async_trait]
impl UploadEndpoint for HttpEndpoint {
    async fn send(
        &self,
        content_type: String,
        body: reqwest::Body,
    ) -> Result<UploadResponse, EndpointError> {
        let mut request = self
            .client
            .post(&self.target.url)
            .header(CONTENT_TYPE, content_type)
            .body(body);
        if let Some(expires) = &self.target.expires {
            request = request.query(&[("expires", expires)]);
        }

        debug!(url = %self.target.url, "sending upload request");
        let response = request.send().await?.error_for_status()?;
        let raw: serde_json::Value = response.json().await?;
        let parsed = parse_response(raw)?;
        info!(link = %parsed.link, "upload accepted");
        Ok(parsed)
    }
}

/// Terminal state of a single-attempt upload.
#[derive(Debug)]
pub enum SingleOutcome {
    Completed(UploadResponse),
    /// The user interrupted the transfer; the display was finalized and an
    /// abort notice printed.
    Aborted,
}

/// Perform one upload attempt with live progress on stderr.
///
/// An interrupt signal during the transfer is recovered into
/// [`SingleOutcome::Aborted`]; any other failure finalizes the display and
/// propagates.
pub async fn single_upload(
    endpoint: &dyn UploadEndpoint,
    source: Box<dyn ByteSource>,
    filename: &str,
    quiet: bool,
) -> Result<SingleOutcome> {
    let display = (!quiet).then(|| Arc::new(Mutex::new(ProgressDisplay::new(source.known_size()))));

    let (content_type, body, counter) = match &display {
        Some(display) => {
            let sink = Arc::clone(display);
            let monitor = ProgressMonitor::with_callback(source, move |total| {
                if let Ok(mut display) = sink.lock() {
                    display.update(total, false);
                }
            });
            let counter = monitor.counter();
            let encoder = MultipartEncoder::new(FIELD_NAME, monitor, Some(filename));
            let content_type = encoder.content_type();
            let body = reqwest::Body::wrap_stream(encoder.into_stream(true, DEFAULT_CHUNK_SIZE));
            (content_type, body, Some(counter))
        }
        None => {
            let encoder = MultipartEncoder::new(FIELD_NAME, source, Some(filename));
            let content_type = encoder.content_type();
            let body = reqwest::Body::wrap_stream(encoder.into_stream(true, DEFAULT_CHUNK_SIZE));
            (content_type, body, None)
        }
    };

    let outcome = tokio::select! {
        result = endpoint.send(content_type, body) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        None => {
            if let Some(display) = &display {
                if let Ok(mut display) = display.lock() {
                    display.finish();
                }
            }
            info!("upload interrupted by user");
            eprintln!("aborted.");
            Ok(SingleOutcome::Aborted)
        }
        Some(Err(e)) => {
            if let Some(display) = &display {
                if let Ok(mut display) = display.lock() {
                    display.finish();
                }
            }
            error!(error = %e, "upload failed");
            Err(anyhow!(e))
        }
        Some(Ok(response)) => {
            if let (Some(display), Some(counter)) = (&display, &counter) {
                if let Ok(mut display) = display.lock() {
                    display.update(counter.load(Ordering::Relaxed), true);
                    display.finish();
                }
            }
            Ok(SingleOutcome::Completed(response))
        }
    }
}

/// Dispatch `attempts` concurrent upload attempts reading from the same
/// already-opened source handle, without progress display.
///
/// Results come back in submission order regardless of completion order;
/// each entry is the response of the attempt at that index. The first
/// failure fails the whole batch.
pub async fn multi_upload(
    endpoint: &dyn UploadEndpoint,
    source: Box<dyn ByteSource>,
    filename: &str,
    attempts: usize,
) -> Result<Vec<UploadResponse>> {
    info!(attempts, "dispatching concurrent upload attempts");
    let shared = SharedSource::new(source);

    let tasks = (0..attempts).map(|index| {
        let source = shared.clone();
        async move {
            let encoder = MultipartEncoder::new(FIELD_NAME, source, Some(filename));
            let content_type = encoder.content_type();
            let body = reqwest::Body::wrap_stream(encoder.into_stream(true, DEFAULT_CHUNK_SIZE));
            let result = endpoint.send(content_type, body).await;
            debug!(index, ok = result.is_ok(), "upload attempt settled");
            result
        }
    });

    join_all(tasks)
        .await
        .into_iter()
        .map(|result| result.map_err(|e| anyhow!(e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use serde_json::json;

    fn fake_response() -> UploadResponse {
        UploadResponse {
            link: "https://example/abc".to_string(),
            raw: json!({"link": "https://example/abc"}),
        }
    }

    fn memory_source(len: usize) -> Box<dyn ByteSource> {
        Box::new(MemorySource::new(vec![7u8; len]))
    }

    #[test]
    fn parse_response_extracts_the_link_and_keeps_the_raw_object() {
        let raw = json!({"link": "https://example/abc", "expiry": "14 days"});
        let response = parse_response(raw.clone()).expect("link present");
        assert_eq!(response.link, "https://example/abc");
        assert_eq!(response.raw, raw);
    }

    #[test]
    fn parse_response_rejects_a_body_without_a_link() {
        let err = parse_response(json!({"success": true})).expect_err("link missing");
        assert!(err.to_string().contains("link"), "error: {err}");
    }

    #[tokio::test]
    async fn single_upload_returns_the_extracted_link() {
        let mut endpoint = MockUploadEndpoint::new();
        endpoint
            .expect_send()
            .times(1)
            .returning(|content_type, _| {
                assert!(content_type.starts_with("multipart/form-data; boundary="));
                Ok(fake_response())
            });

        let outcome = single_upload(&endpoint, memory_source(10), "data.bin", true)
            .await
            .expect("upload should succeed");
        match outcome {
            SingleOutcome::Completed(response) => {
                assert_eq!(response.link, "https://example/abc");
            }
            SingleOutcome::Aborted => panic!("unexpected abort"),
        }
    }

    #[tokio::test]
    async fn single_upload_propagates_endpoint_errors() {
        let mut endpoint = MockUploadEndpoint::new();
        endpoint
            .expect_send()
            .times(1)
            .returning(|_, _| Err("503 Service Unavailable".into()));

        let result = single_upload(&endpoint, memory_source(10), "data.bin", true).await;
        let err = result.expect_err("endpoint failure must propagate");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn multi_upload_collects_one_link_per_attempt() {
        let mut endpoint = MockUploadEndpoint::new();
        endpoint
            .expect_send()
            .times(3)
            .returning(|_, _| Ok(fake_response()));

        let responses = multi_upload(&endpoint, memory_source(64), "data.bin", 3)
            .await
            .expect("all attempts should succeed");
        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|r| r.link == "https://example/abc"));
    }

    #[tokio::test]
    async fn multi_upload_fails_when_any_attempt_fails() {
        let mut endpoint = MockUploadEndpoint::new();
        let mut calls = 0;
        endpoint.expect_send().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 2 {
                Err("connection reset".into())
            } else {
                Ok(fake_response())
            }
        });

        let result = multi_upload(&endpoint, memory_source(64), "data.bin", 2).await;
        assert!(result.is_err());
    }
}
