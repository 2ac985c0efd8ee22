//! # parley-server
//!
//! TCP front end for the Parley chat server: configuration, metrics and the
//! event loop that connects sockets to a [`parley_core::Hub`].

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{run_server, Server, ServerError};
