//! # Registry janitor
//!
//! An HTTP service for browsing a container registry's inventory and pruning
//! images that are no longer pulled.
//!
//! ## Example
//!
//! ```no_run
//! use inventory::{Inventory, MemoryRegistry};
//! use janitor::JanitorBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = JanitorBuilder::new(Inventory::new(MemoryRegistry::new()))
//!     .allow_origin("http://localhost:3000".parse()?)
//!     .build();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8081").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use inventory::Inventory;
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[cfg(feature = "cli")]
pub mod config;
mod error;
mod routes;

pub use error::{ServiceError, ServiceResult};
pub use routes::DEFAULT_LIMIT;

/// Builder for the janitor HTTP service
#[derive(Debug)]
pub struct JanitorBuilder {
    inventory: Inventory,
    origins: Vec<HeaderValue>,
}

impl JanitorBuilder {
    /// Create a builder serving `inventory`
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory,
            origins: Vec::new(),
        }
    }

    /// Allow cross-origin requests from `origin`
    pub fn allow_origin(mut self, origin: HeaderValue) -> Self {
        self.origins.push(origin);
        self
    }

    /// Allow cross-origin requests from each of `origins`
    pub fn allow_origins(mut self, origins: impl IntoIterator<Item = HeaderValue>) -> Self {
        self.origins.extend(origins);
        self
    }

    /// Build the service
    ///
    /// Returns a Router that can be served with any tower-compatible server
    pub fn build(self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        Router::new()
            .route("/health", get(health))
            .merge(routes::router())
            .with_state(self.inventory)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }
}

async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
