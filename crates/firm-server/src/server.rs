use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use firm_bridge::Bridge;
use firm_ledger::{Create2Deployer, JsonRpcLedger};
use firm_store::KuboClient;

use crate::config::{NodeConfig, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Wire a bridge to a Kubo node and a JSON-RPC ledger as configured.
/// Nothing is contacted until the bridge is initialized.
pub fn build_bridge(config: &NodeConfig) -> ServerResult<Bridge> {
    let store = Arc::new(KuboClient::new(config.store.api_url.clone())?);
    let ledger = Arc::new(JsonRpcLedger::new(
        config.ledger.rpc_url.clone(),
        config.ledger.from,
    )?);
    let deployer = Arc::new(Create2Deployer::new(
        ledger.clone(),
        config.ledger.deployer_config()?,
    ));
    Ok(Bridge::new(store, ledger, deployer, config.bridge_config()))
}

/// firmnode HTTP server.
pub struct FirmServer {
    config: ServerConfig,
    bridge: Arc<Bridge>,
}

impl FirmServer {
    pub fn new(config: ServerConfig, bridge: Arc<Bridge>) -> Self {
        Self { config, bridge }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(self.bridge.clone()), self.config.max_bundle_size)
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `signal` completes.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("firmnode listening on {}", self.config.bind_addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
