//! HTTP server startup logic.

use std::net::SocketAddr;

use axum::Router;
use axum_server::Handle;

use crate::config::HttpServerConfig;

use super::shutdown;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid http.host or http.port: {0}")]
    Address(String),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

pub fn bind_address(config: &HttpServerConfig) -> Result<SocketAddr, ServerError> {
    format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e: std::net::AddrParseError| ServerError::Address(e.to_string()))
}

/// Serve `app` until a shutdown signal arrives and connections drain.
pub async fn start_server(app: Router, config: &HttpServerConfig) -> Result<(), ServerError> {
    let addr = bind_address(config)?;
    let handle = Handle::new();

    shutdown::setup_shutdown_handler(handle.clone());

    tracing::info!(%addr, "Starting HTTP server");

    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str, port: u16) -> HttpServerConfig {
        HttpServerConfig {
            host: host.to_string(),
            port,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }

    #[test]
    fn test_bind_address() {
        let addr = bind_address(&config("0.0.0.0", 8000)).unwrap();
        assert_eq!(addr, SocketAddr::from(([0, 0, 0, 0], 8000)));

        let err = bind_address(&config("not a host", 8000)).unwrap_err();
        assert!(matches!(err, ServerError::Address(_)));
    }
}
