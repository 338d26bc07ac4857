//! Rollover Runtime Client
//!
//! A small, type-safe client for the container runtime the runner drives.
//!
//! The runner only needs four capabilities, captured by [`ContainerRuntime`]:
//! list containers, inspect one, stop one, start one. Two implementations are
//! provided:
//! - [`EngineClient`]: talks to the Engine HTTP API on a configured host/port
//! - [`CliClient`]: shells out to the local `docker` (or compatible) binary,
//!   which uses the runtime's default local connection
//!
//! [`MockRuntime`] is an in-memory implementation for tests.
//!
//! # Example
//!
//! ```no_run
//! use rollover_client::{connect, RuntimeEndpoint};
//!
//! #[tokio::main]
//! async fn main() -> rollover_client::Result<()> {
//!     let runtime = connect(&RuntimeEndpoint::Engine {
//!         host: "localhost".to_string(),
//!         port: 2375,
//!     });
//!
//!     for container in runtime.list_containers().await? {
//!         println!("{} {:?}", container.id, container.labels);
//!     }
//!     Ok(())
//! }
//! ```

mod cli;
mod engine;
pub mod error;
mod mock;

// Re-export commonly used types
pub use cli::CliClient;
pub use engine::EngineClient;
pub use error::{ClientError, Result};
pub use mock::MockRuntime;

use async_trait::async_trait;
use rollover_core::domain::container::{ContainerDetails, ContainerSummary};
use std::fmt;
use std::sync::Arc;

/// Capabilities the runner consumes from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lists the containers currently known to the runtime
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// Inspects a single container to learn when it was started
    async fn inspect(&self, id: &str) -> Result<ContainerDetails>;

    /// Stops a container, waiting for the runtime to acknowledge
    async fn stop(&self, id: &str) -> Result<()>;

    /// Starts a previously stopped container
    async fn start(&self, id: &str) -> Result<()>;
}

/// Where the runtime is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEndpoint {
    /// Engine HTTP API at `http://host:port`
    Engine { host: String, port: u16 },

    /// Local CLI binary (e.g. `docker`, `podman`) on its default connection
    Cli { program: String },
}

impl fmt::Display for RuntimeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeEndpoint::Engine { host, port } => write!(f, "http://{}:{}", host, port),
            RuntimeEndpoint::Cli { program } => write!(f, "local {} CLI", program),
        }
    }
}

/// Builds the runtime client matching an endpoint
pub fn connect(endpoint: &RuntimeEndpoint) -> Arc<dyn ContainerRuntime> {
    match endpoint {
        RuntimeEndpoint::Engine { host, port } => {
            Arc::new(EngineClient::new(format!("http://{}:{}", host, port)))
        }
        RuntimeEndpoint::Cli { program } => Arc::new(CliClient::new(program.clone())),
    }
}
