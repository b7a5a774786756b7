//! Event forwarding to the barrier.
//!
//! The [`Forwarder`] encodes an [`Event`] as JSON, posts it once to the
//! configured [`Barrier`] and classifies the outcome into a [`ForwardError`].
//! Only `202 Accepted` counts as delivery.
//!
//! # Example
//!
//! ```rust,ignore
//! use iflogs::{Barrier, Event, Forwarder};
//! use std::time::Duration;
//!
//! let forwarder = Forwarder::new(
//!     Barrier::new("http://barrier.internal:9000/events")
//!         .with_timeout(Duration::from_secs(2)),
//! );
//!
//! forwarder.push(&Event::auth("10.0.0.5", "web")).await?;
//! ```

pub mod transport;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::event::Event;

pub use transport::{BarrierRequest, HttpTransport, Transport};

/// Placeholder barrier URL used when none is configured.
pub const DEFAULT_BARRIER_URL: &str = "localhost";

/// Default bound on a single push, including connect time.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The only status the barrier answers with when it took the event.
pub const ACCEPTED_STATUS: u16 = 202;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors that can occur while forwarding an event.
#[derive(Error, Debug)]
pub enum ForwardError {
    /// The event could not be encoded
    #[error("json marshal error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The outbound request could not be built
    #[error("request error: {0}")]
    Request(String),

    /// The request never got a response (refused, DNS, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// The barrier answered with something other than 202
    #[error("barrier did not accept the event (status {status})")]
    Rejected { status: u16 },
}

/// Where events are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barrier {
    url: String,
    timeout: Duration,
}

impl Barrier {
    /// Create a barrier pointing at the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the bound on a single push
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new(DEFAULT_BARRIER_URL)
    }
}

/// Sends events to a barrier.
///
/// Cheap to clone; clones share the transport. Holds no per-request state,
/// so one instance serves every concurrent request.
#[derive(Clone)]
pub struct Forwarder {
    barrier: Barrier,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("barrier", &self.barrier)
            .finish_non_exhaustive()
    }
}

impl Forwarder {
    /// Create a forwarder using the HTTP transport
    pub fn new(barrier: Barrier) -> Self {
        Self::with_transport(barrier, Arc::new(HttpTransport::new()))
    }

    /// Create a forwarder with a custom transport
    pub fn with_transport(barrier: Barrier, transport: Arc<dyn Transport>) -> Self {
        Self { barrier, transport }
    }

    pub fn barrier(&self) -> &Barrier {
        &self.barrier
    }

    /// Encode an event as the JSON body sent to the barrier
    pub fn encode(event: &Event) -> Result<Vec<u8>, ForwardError> {
        Ok(serde_json::to_vec(event)?)
    }

    /// Forward one event and wait for the barrier's answer.
    ///
    /// The whole exchange is bounded by the barrier timeout; hitting it is
    /// reported as [`ForwardError::Transport`].
    pub async fn push(&self, event: &Event) -> Result<(), ForwardError> {
        let body = Self::encode(event)?;

        debug!(
            url = %self.barrier.url,
            kind = %event.kind(),
            bytes = body.len(),
            "Forwarding event"
        );

        let request = BarrierRequest {
            url: self.barrier.url.clone(),
            content_type: JSON_CONTENT_TYPE,
            body,
        };

        let status = tokio::time::timeout(self.barrier.timeout, self.transport.post(request))
            .await
            .map_err(|_| {
                ForwardError::Transport(format!(
                    "no response from barrier within {}ms",
                    self.barrier.timeout.as_millis()
                ))
            })??;

        if status != ACCEPTED_STATUS {
            warn!(
                url = %self.barrier.url,
                status = status,
                kind = %event.kind(),
                "Barrier rejected event"
            );
            return Err(ForwardError::Rejected { status });
        }

        debug!(url = %self.barrier.url, kind = %event.kind(), "Event accepted");
        Ok(())
    }

    /// Forward one event on its own task and wait for it.
    ///
    /// The caller's future can be dropped (e.g. the client hung up) without
    /// cancelling the push; the spawned task still runs to completion.
    pub async fn push_detached(&self, event: Event) -> Result<(), ForwardError> {
        let forwarder = self.clone();
        let handle = tokio::spawn(async move { forwarder.push(&event).await });

        handle
            .await
            .map_err(|e| ForwardError::Transport(format!("forwarding task failed: {}", e)))?
    }
}
