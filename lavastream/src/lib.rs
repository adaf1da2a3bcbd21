//! # lavastream - Pipeline de streaming de Spotilava
//!
//! Relie les adaptateurs de `lavasource` à un client HTTP :
//!
//! - [`pipeline`] : résolution, négociation, détection du conteneur et
//!   injection des métadonnées ;
//! - [`relay`] : relais du reste du flux par morceaux de taille fixe ;
//! - [`gateway`] : fournisseurs activés et leurs politiques ;
//! - [`api_rest`] : routes `/{id}`, `/{id}/listen` et leurs variantes
//!   `/tidal/...` et `/deezer/...` ;
//! - [`GatewayServerExt`] : montage des routes sur un `lavaserver::Server`.
//!
//! ## Exemple
//!
//! ```rust,ignore
//! use lavastream::{Gateway, api_rest::create_router};
//! use std::sync::Arc;
//!
//! let gateway = Gateway::builder()
//!     .chunk_size(8192)
//!     .adapter(spotify_adapter)
//!     .build()?;
//! let router = create_router(Arc::new(gateway));
//! ```

pub mod api_rest;
pub mod gateway;
pub mod lavaserver_ext;
pub mod pipeline;
pub mod query;
pub mod relay;
pub mod state;

mod lavaserver_impl;

pub use gateway::{Gateway, GatewayBuilder};
pub use lavaserver_ext::GatewayServerExt;
pub use pipeline::{PreparedStream, StreamPipeline};
pub use query::ListenOverrides;
pub use relay::Relay;
pub use state::{PipelineState, Progress};
