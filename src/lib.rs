//! # iflogs
//!
//! Request interception that forwards one access event per inbound request
//! to a remote collection endpoint, the barrier.
//!
//! ## Architecture
//!
//! ```text
//! Request -> Interceptor -> extract() -> Event -> Forwarder -> POST barrier (202)
//!                 |
//!                 +-> handler (always in decorator mode, on success in gate mode)
//! ```
//!
//! ## Modules
//!
//! - [`event`]: Event shapes sent to the barrier
//! - [`extract`]: Building events from request metadata
//! - [`forwarder`]: Encoding, delivery and failure classification
//! - [`intercept`]: Gate and decorator middleware for axum
//! - [`config`]: TOML configuration
//! - [`shutdown`]: Graceful shutdown for the bundled binaries

pub mod config;
pub mod event;
pub mod extract;
pub mod forwarder;
pub mod intercept;
pub mod shutdown;

// Re-export commonly used types at crate root
pub use event::{ApiEndpointLog, AuthLog, Event, EventKind};
pub use extract::{extract, ExtractionError, HttpRequestContext, RequestContext};
pub use forwarder::{Barrier, ForwardError, Forwarder, HttpTransport, Transport};
pub use intercept::{decorate, gate, InterceptError, Interceptor, Mode};
