//! Graceful shutdown for the bundled servers.
//!
//! [`ShutdownSignal`] resolves when the process receives Ctrl+C or SIGTERM,
//! or when [`ShutdownSignal::trigger`] is called. It is handed to
//! `axum::serve(..).with_graceful_shutdown(..)` so in-flight requests, and
//! the pushes they are waiting on, finish before the server exits.
//!
//! # Example
//!
//! ```rust,ignore
//! let shutdown = ShutdownSignal::new();
//! axum::serve(listener, app)
//!     .with_graceful_shutdown(shutdown.clone().wait())
//!     .await?;
//! ```

use tokio::sync::watch;
use tracing::{error, info};

/// A cloneable shutdown trigger.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Resolve on Ctrl+C, SIGTERM or a manual trigger, whichever comes first.
    pub async fn wait(self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let mut receiver = self.sender.subscribe();
        let triggered = async move {
            // An error means every sender is gone; nobody can trigger anymore.
            if receiver.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
            _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
            _ = triggered => info!("Shutdown triggered programmatically"),
        }
    }

    /// Trigger shutdown manually (for tests or programmatic shutdown).
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Whether shutdown has been triggered manually.
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
