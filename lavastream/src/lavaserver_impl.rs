//! Implémentation de [`GatewayServerExt`] pour `lavaserver::Server`

use crate::api_rest::create_router;
use crate::gateway::{Gateway, GatewayBuilder};
use crate::lavaserver_ext::GatewayServerExt;
use anyhow::Result;
use lavaserver::Server;
use lavasource::Adapter;
use std::sync::Arc;
use tracing::info;

impl GatewayServerExt for Server {
    async fn init_gateway(&mut self, adapters: Vec<Adapter>) -> Result<Arc<Gateway>> {
        info!("Initializing streaming gateway...");
        let config = lavaconfig::get_config();
        let gateway = Arc::new(GatewayBuilder::from_config(&config, adapters)?);
        Ok(self.init_gateway_with(gateway).await)
    }

    async fn init_gateway_with(&mut self, gateway: Arc<Gateway>) -> Arc<Gateway> {
        self.add_router("/", create_router(gateway.clone())).await;
        info!(
            providers = ?gateway.providers(),
            chunk_size = gateway.chunk_size(),
            "Streaming gateway initialized"
        );
        gateway
    }
}
