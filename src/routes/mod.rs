use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Extension, Router};
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer, services::ServeDir};

use crate::{config::Config, relay::SharedRelay};

pub mod health;
pub mod page;
pub mod ws;

pub fn router() -> Router {
    Router::new()
        .merge(health::router())
        .nest("/ws", ws::router())
}

/// Chat endpoints, static assets, and the page shell as fallback.
pub fn app(relay: SharedRelay, config: &Config) -> Router {
    router()
        .nest_service("/assets", ServeDir::new(config.static_dir.join("assets")))
        .fallback(page::render_page)
        .layer(Extension(relay))
        .layer(Extension(Arc::new(page::PageShell::new(config.static_dir.clone()))))
        .layer(Extension(ws::WsLimit(config.body_limit)))
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(RequestBodyLimitLayer::new(config.body_limit))
}
