//! HTTP server lifecycle.
//!
//! Plain HTTP on the configured address; TLS is expected to be terminated in
//! front of the container. SIGTERM and SIGINT drain in-flight requests before
//! the server returns.

mod probe;
mod server;
mod shutdown;

pub use probe::probe_health;
pub use server::{bind_address, start_server, ServerError};
