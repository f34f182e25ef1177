use axum::{extract::Extension, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::{bus::FanoutBus, relay::SharedRelay, store::HistoryStore};

#[derive(Debug, Serialize)]
pub struct Health {
    pub store: bool,
    pub bus: bool,
    pub connections: usize,
}

pub fn router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz(Extension(relay): Extension<SharedRelay>) -> (StatusCode, Json<Health>) {
    let (store, bus) = tokio::join!(relay.store().healthy(), relay.bus().healthy());
    let connections = relay.registry().len().await;

    let code = if store && bus { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(Health { store, bus, connections }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::bus::{memory::MemoryFanoutBus, AnyFanoutBus};
    use crate::relay::Relay;
    use crate::store::{memory::MemoryHistoryStore, AnyHistoryStore};

    #[tokio::test]
    async fn memory_backends_are_healthy() {
        let relay: SharedRelay = Arc::new(Relay::new(
            AnyHistoryStore::Memory(MemoryHistoryStore::new(50)),
            AnyFanoutBus::Memory(MemoryFanoutBus::default()),
            "chat_messages",
        ));
        let (_session, _rx) = relay.join().await;

        let app = router().layer(Extension(relay));
        let resp = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["store"], true);
        assert_eq!(json["bus"], true);
        assert_eq!(json["connections"], 1);
    }
}
