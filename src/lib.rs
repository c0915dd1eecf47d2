//! # formpilot
//!
//! Fill web job-application forms from a parsed resume. The agent side
//! catalogs a page's interactive elements and acts on them by index (served
//! to LLM agents over MCP); the resume side turns an uploaded PDF into a typed
//! record (served over HTTP).

pub mod config;
pub mod mcp;
pub mod server;

pub use config::{Config, ServerConfig};

/// Result type for formpilot binary-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from configuration and the services built on it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Agent(#[from] formpilot_agent::Error),

    #[error(transparent)]
    Resume(#[from] formpilot_resume::Error),
}
