//! SimpleMX management endpoint.
//!
//! Serves a [`simplemx_core::Registry`] over TCP. Each message is a 4-byte
//! big-endian length followed by a JSON document; see [`protocol`] for the
//! request and response shapes and [`ManagementClient`] for the client side.
//!
//! ```no_run
//! use simplemx_server::{ManagementServer, ServerConfig};
//!
//! # async fn run() -> Result<(), simplemx_server::ServerError> {
//! let server = ManagementServer::new(ServerConfig::with_port(8000));
//! server.start().await?;
//! // register objects with server.register(&object).await?
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod server;
pub mod stats;

pub use client::{ClientError, ManagementClient};
pub use config::{ConfigError, ServerConfig};
pub use connection::{ConnectionError, DEFAULT_MAX_MESSAGE_SIZE};
pub use error::{Result, ServerError};
pub use listener::Catalog;
pub use protocol::{Request, Response};
pub use server::ManagementServer;
pub use stats::ListenerStats;
