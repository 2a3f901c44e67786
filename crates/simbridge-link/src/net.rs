//! Endpoint resolution shared by both channels.

use std::net::SocketAddr;

use simbridge_types::BridgeError;

/// Resolve `host:port` to the first address the resolver returns.
pub(crate) async fn resolve(host: &str, port: u16) -> Result<SocketAddr, BridgeError> {
    let endpoint = format!("{host}:{port}");
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| setup_error(&endpoint, e))?;
    addrs.next().ok_or_else(|| BridgeError::Setup {
        endpoint,
        details: "host resolved to no addresses".to_string(),
    })
}

pub(crate) fn setup_error(endpoint: &str, err: std::io::Error) -> BridgeError {
    BridgeError::Setup {
        endpoint: endpoint.to_string(),
        details: err.to_string(),
    }
}
