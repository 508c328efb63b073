//! Prometheus exporter

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("Failed to install Prometheus exporter: {0}")]
pub struct MetricsInstallError(String);

/// Install the global recorder and serve `/metrics` on `addr`.
/// Must be called from within a tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), MetricsInstallError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsInstallError(e.to_string()))?;

    super::init_metrics();
    info!(%addr, "prometheus exporter listening");
    Ok(())
}
