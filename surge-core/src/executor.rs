use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use surge_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};
use tokio::time::Instant;

use crate::payload::TicketPayload;

pub type TransportError = surge_http::Error;

/// Sends one HTTP request. Implemented by [`HttpClient`]; tests plug in fakes.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl Transport for HttpClient {
    fn send(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        self.request(req)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    /// Ticket created (201).
    Success,
    /// Degraded but accepted response (500).
    ExpectedFailure,
    /// Any other status, a timeout, or a transport error.
    UnexpectedFailure,
}

impl OutcomeClass {
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            201 => Self::Success,
            500 => Self::ExpectedFailure,
            _ => Self::UnexpectedFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    pub class: OutcomeClass,
    pub latency: Duration,
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub error_kind: Option<HttpTransportErrorKind>,
    /// Latency exceeded the configured ceiling. Independent of `class`.
    pub slow: bool,
}

impl RequestOutcome {
    fn failed(kind: HttpTransportErrorKind, latency: Duration, ceiling: Duration) -> Self {
        Self {
            class: OutcomeClass::UnexpectedFailure,
            latency,
            status: None,
            error_kind: Some(kind),
            slow: latency > ceiling,
        }
    }
}

/// Posts ticket payloads to the target and classifies the result.
#[derive(Debug)]
pub struct RequestExecutor<T> {
    transport: Arc<T>,
    url: String,
    timeout: Duration,
    latency_ceiling: Duration,
}

impl<T> Clone for RequestExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            url: self.url.clone(),
            timeout: self.timeout,
            latency_ceiling: self.latency_ceiling,
        }
    }
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(
        transport: Arc<T>,
        url: impl Into<String>,
        timeout: Duration,
        latency_ceiling: Duration,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            timeout,
            latency_ceiling,
        }
    }

    pub async fn execute(&self, payload: &TicketPayload) -> RequestOutcome {
        let req = match HttpRequest::post_json(self.url.as_str(), payload) {
            Ok(req) => req,
            Err(err) => {
                return RequestOutcome::failed(
                    err.transport_error_kind(),
                    Duration::ZERO,
                    self.latency_ceiling,
                );
            }
        };

        let started = Instant::now();
        let res = tokio::time::timeout(self.timeout, self.transport.send(req)).await;
        let latency = started.elapsed();

        match res {
            Ok(Ok(res)) => RequestOutcome {
                class: OutcomeClass::from_status(res.status),
                latency,
                status: Some(res.status),
                error_kind: None,
                slow: latency > self.latency_ceiling,
            },
            Ok(Err(err)) => {
                RequestOutcome::failed(err.transport_error_kind(), latency, self.latency_ceiling)
            }
            Err(_) => RequestOutcome::failed(
                HttpTransportErrorKind::Timeout,
                latency,
                self.latency_ceiling,
            ),
        }
    }
}
