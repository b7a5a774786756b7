//! Interception of inbound requests.
//!
//! An [`Interceptor`] extracts an event from each request and forwards it to
//! the barrier before the request reaches its handler. Two axum middleware
//! functions decide what a failure means for the request:
//!
//! - [`gate`]: the request is answered with `400` and the handler never runs.
//! - [`decorate`]: the handler always runs; its response is marked `400` and
//!   carries the failure in the [`LOG_ERROR_HEADER`] header.
//!
//! ```text
//! Received -> Extracting -> Forwarding -> Accepted -> Delegated
//!                  |             |
//!                  +-------------+---> Failed -> Aborted   (gate)
//!                                             -> Delegated (decorator)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{middleware, routing::get, Router};
//! use iflogs::{gate, Barrier, EventKind, Forwarder, Interceptor};
//!
//! let interceptor = Interceptor::new(Forwarder::new(Barrier::new(url)), EventKind::Api);
//!
//! let app = Router::new()
//!     .route("/orders", get(list_orders))
//!     .layer(middleware::from_fn_with_state(interceptor, gate));
//! ```

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::event::{Event, EventKind};
use crate::extract::{extract, extract_lenient, ExtractionError, HttpRequestContext, RequestContext};
use crate::forwarder::{ForwardError, Forwarder};

/// Response header carrying the forwarding failure in decorator mode.
pub const LOG_ERROR_HEADER: &str = "ifx-log-error";

/// Prefix of every client-visible failure message.
pub const FAILURE_PREFIX: &str = "Unable to write log, error : ";

/// Why an intercepted request could not be logged.
#[derive(Error, Debug)]
pub enum InterceptError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl InterceptError {
    /// Message shown to the client
    pub fn client_message(&self) -> String {
        format!("{}{}", FAILURE_PREFIX, self)
    }
}

impl IntoResponse for InterceptError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self.client_message())).into_response()
    }
}

/// What a failure to log means for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Abort the request
    Gate,
    /// Report the failure, run the handler anyway
    Decorator,
}

impl Mode {
    /// Terminal state of a request given whether logging failed
    pub fn disposition(&self, failed: bool) -> Disposition {
        match (self, failed) {
            (Mode::Gate, true) => Disposition::Aborted,
            _ => Disposition::Delegated,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Gate => f.write_str("gate"),
            Mode::Decorator => f.write_str("decorator"),
        }
    }
}

/// Non-terminal states an intercepted request passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Extracting,
    Forwarding,
    /// The barrier answered 202
    Accepted,
    /// Extraction or forwarding failed
    Failed,
}

/// Terminal state of an intercepted request.
///
/// Both middleware functions attach it to the response extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The handler did not run
    Aborted,
    /// The handler ran
    Delegated,
}

/// Extracts and forwards one event per request.
///
/// Used as axum middleware state; cloning shares the forwarder.
#[derive(Debug, Clone)]
pub struct Interceptor {
    forwarder: Forwarder,
    kind: EventKind,
}

impl Interceptor {
    pub fn new(forwarder: Forwarder, kind: EventKind) -> Self {
        Self { forwarder, kind }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Extract the event for this request and forward it.
    ///
    /// Host-agnostic: any [`RequestContext`] works. The push runs on its own
    /// task, so dropping this future does not cancel it.
    pub async fn intercept<C>(&self, ctx: &C) -> Result<(), InterceptError>
    where
        C: RequestContext + ?Sized,
    {
        trace_stage(Stage::Extracting, ctx);
        let event = extract(ctx, self.kind).inspect_err(|_| trace_stage(Stage::Failed, ctx))?;

        self.forward(event, ctx).await
    }

    /// Like [`Interceptor::intercept`], but a missing access token does not
    /// stop the push: the event goes out with an empty token and the
    /// extraction error is still returned.
    pub async fn intercept_lenient<C>(&self, ctx: &C) -> Result<(), InterceptError>
    where
        C: RequestContext + ?Sized,
    {
        trace_stage(Stage::Extracting, ctx);
        let (event, extraction) = extract_lenient(ctx, self.kind);

        let forwarded = self.forward(event, ctx).await;

        match extraction {
            Some(e) => {
                if let Err(push) = &forwarded {
                    warn!(error = %push, path = %ctx.path(), "Event with blank token not forwarded");
                }
                trace_stage(Stage::Failed, ctx);
                Err(e.into())
            }
            None => forwarded,
        }
    }

    async fn forward<C>(&self, event: Event, ctx: &C) -> Result<(), InterceptError>
    where
        C: RequestContext + ?Sized,
    {
        trace_stage(Stage::Forwarding, ctx);

        match self.forwarder.push_detached(event).await {
            Ok(()) => {
                trace_stage(Stage::Accepted, ctx);
                Ok(())
            }
            Err(e) => {
                trace_stage(Stage::Failed, ctx);
                Err(e.into())
            }
        }
    }
}

fn trace_stage<C>(stage: Stage, ctx: &C)
where
    C: RequestContext + ?Sized,
{
    debug!(stage = ?stage, path = %ctx.path(), method = %ctx.method(), "Interception stage");
}

/// Gate-mode middleware: halts the chain when the event cannot be logged.
pub async fn gate(State(interceptor): State<Interceptor>, req: Request, next: Next) -> Response {
    let ctx = HttpRequestContext::from_request(&req);
    trace_stage(Stage::Received, &ctx);

    let outcome = interceptor.intercept(&ctx).await;
    let disposition = Mode::Gate.disposition(outcome.is_err());

    let mut response = match outcome {
        Ok(()) => next.run(req).await,
        Err(e) => {
            warn!(
                error = %e,
                path = %ctx.path(),
                method = %ctx.method(),
                disposition = ?disposition,
                "Unable to write log, aborting request"
            );
            e.into_response()
        }
    };

    response.extensions_mut().insert(disposition);
    response
}

/// Decorator-mode middleware: always runs the wrapped handler.
///
/// A missing access token does not stop the event: it is forwarded with an
/// empty token. On any failure the handler's response is returned with
/// status `400` and the client message in [`LOG_ERROR_HEADER`].
pub async fn decorate(
    State(interceptor): State<Interceptor>,
    req: Request,
    next: Next,
) -> Response {
    let ctx = HttpRequestContext::from_request(&req);
    trace_stage(Stage::Received, &ctx);

    let outcome = interceptor.intercept_lenient(&ctx).await;
    let disposition = Mode::Decorator.disposition(outcome.is_err());

    let mut response = next.run(req).await;

    if let Err(e) = outcome {
        warn!(
            error = %e,
            path = %ctx.path(),
            method = %ctx.method(),
            disposition = ?disposition,
            "Unable to write log, continuing request"
        );

        *response.status_mut() = StatusCode::BAD_REQUEST;
        if let Ok(value) = HeaderValue::from_str(&header_safe(&e.client_message())) {
            response.headers_mut().insert(LOG_ERROR_HEADER, value);
        }
    }

    response.extensions_mut().insert(disposition);
    response
}

/// Replace characters a header value cannot hold
fn header_safe(message: &str) -> String {
    message
        .chars()
        .map(|c| if c == '\t' || (' '..='~').contains(&c) { c } else { ' ' })
        .collect()
}
