//! # lavaserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit le socle HTTP de la passerelle Spotilava :
//!
//! - [`server`] : le [`Server`] et son [`ServerBuilder`], qui accumulent des
//!   routes Axum puis les servent sur le port configuré ;
//! - [`logs`] : l'initialisation de `tracing`, le tampon circulaire des
//!   logs et leurs routes (`/log-sse`, `/log-dump`, `/api/logs/log_setup`).
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use lavaserver::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new_configured().build();
//!     server.init_logging().await;
//!
//!     server.add_route("/api/status", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, SseLayer, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerInfo};
