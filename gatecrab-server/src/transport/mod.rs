//! Transport layer for the gatecrab server
//!
//! Transports implement the [`Transport`] trait and serve requests against
//! the shared [`AppState`].
//!
//! # Available Transports
//!
//! - [`http`]: REST API with JSON

pub mod http;

#[cfg(test)]
mod http_test;

use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future that resolves when the server should stop accepting requests
pub type Shutdown = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Common interface for all transport implementations
///
/// Each transport is responsible for:
/// - Accepting client connections
/// - Parsing protocol-specific requests
/// - Calling into the quota and token policies
/// - Sending responses back to clients
#[async_trait]
pub trait Transport {
    /// Start the transport server
    ///
    /// Runs until an error occurs or `shutdown` resolves, after which
    /// in-flight requests are allowed to finish.
    async fn start(self, state: Arc<AppState>, shutdown: Shutdown) -> Result<()>;
}
