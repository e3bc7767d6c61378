//! Route definitions for the gateway API.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;

use crate::{handlers, middleware, state::AppState};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors = middleware::cors_layer(&server.cors_allowed_origins);
    let write_timeout = server.write_timeout;

    Router::new()
        // Public endpoints
        .route("/healthz", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Authenticated API
        .nest("/v1", api_routes(&state))
        // Apply middleware, innermost first
        .layer(TimeoutLayer::new(write_timeout))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::logging_middleware,
        ))
        .layer(from_fn(middleware::request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// Routes under `/v1`, all behind bearer auth
fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/agents", get(handlers::list_agents))
        .route("/router/metrics", get(handlers::router_metrics))
        .route(
            "/router/breakers/:provider/reset",
            post(handlers::reset_breaker),
        )
        .route("/cost", get(handlers::cost_report))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use gateway_agents::AgentRegistry;
    use gateway_config::GatewayConfig;
    use gateway_providers::MockProvider;
    use gateway_routing::Router as GatewayRouter;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_state(config: GatewayConfig) -> AppState {
        let router = GatewayRouter::builder(Arc::new(AgentRegistry::new()))
            .provider(Arc::new(MockProvider::default()))
            .build()
            .unwrap();
        AppState::builder()
            .config(config)
            .router(Arc::new(router))
            .build()
            .unwrap()
    }

    async fn status_of(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(create_test_state(GatewayConfig::default()));
        assert_eq!(status_of(app, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_router(create_test_state(GatewayConfig::default()));
        assert_eq!(status_of(app, "/metrics").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_is_public_when_auth_enabled() {
        let mut config = GatewayConfig::default();
        config.server.auth_token = Some("secret".to_string());
        let state = create_test_state(config);

        assert_eq!(
            status_of(create_router(state.clone()), "/healthz").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(create_router(state), "/v1/agents").await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_unknown_breaker_is_not_found() {
        let app = create_router(create_test_state(GatewayConfig::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/router/breakers/nope/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
