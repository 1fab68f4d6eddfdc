//! Administrative and reporting surface.
//!
//! # Routes
//! ```text
//! GET       /health          unauthenticated liveness
//! GET       /admin/status    version, mode, uptime, rate backend
//! GET       /admin/mode      current mode
//! PUT|POST  /admin/mode      switch mode
//! GET       /admin/stats     lifetime denial counters + recent entries
//! ```
//!
//! Served on its own listener so it is never reachable through the proxied port.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};

use crate::events::EventLog;
use crate::security::{ModeController, RateLimiter};

use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub mode: Arc<ModeController>,
    pub events: Arc<EventLog>,
    pub limiter: Arc<RateLimiter>,
    pub api_key: Arc<str>,
    pub upstream: Arc<str>,
    pub rate_backend: &'static str,
    pub started: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    let protected = Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/mode", get(get_mode).put(set_mode).post(set_mode))
        .route("/admin/stats", get(get_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::pipeline::verdict::{DenyReason, Verdict};
    use crate::events::LogEntry;
    use crate::security::rate_limit::SlidingLogStore;
    use crate::security::{ClientKey, OperatingMode};

    fn state() -> AdminState {
        let window = Duration::from_secs(10);
        AdminState {
            mode: Arc::new(ModeController::default()),
            events: Arc::new(EventLog::new(100, 0)),
            limiter: Arc::new(RateLimiter::new(Arc::new(SlidingLogStore::new(window)), window, 50, 5)),
            api_key: Arc::from("test-key"),
            upstream: Arc::from("http://127.0.0.1:3000"),
            rate_backend: "memory",
            started: Instant::now(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", "Bearer test-key")
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = setup_admin_router(state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["service"], "shield");
    }

    #[tokio::test]
    async fn admin_routes_require_key() {
        let app = setup_admin_router(state());
        let response = app
            .clone()
            .oneshot(Request::get("/admin/mode").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/admin/mode")
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mode_round_trip() {
        let state = state();
        let app = setup_admin_router(state.clone());

        let response = app
            .clone()
            .oneshot(authed("PUT", "/admin/mode", Body::from(r#"{"mode":"restricted"}"#)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["mode"], "restricted");
        assert_eq!(json["previous"], "normal");
        assert_eq!(state.mode.get(), OperatingMode::Restricted);

        let response = app
            .clone()
            .oneshot(authed("POST", "/admin/mode", Body::from(r#"{"restricted":false}"#)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["restricted"], false);
        assert_eq!(state.mode.get(), OperatingMode::Normal);

        let response = app
            .oneshot(authed("POST", "/admin/mode", Body::from("{}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stats_report_counts_and_recent() {
        let state = state();
        let client = ClientKey::from("192.0.2.1".parse::<std::net::IpAddr>().unwrap());
        for _ in 0..3 {
            state
                .events
                .append(LogEntry::now(client.clone(), Verdict::deny(DenyReason::Bot), None, "/"));
        }
        let app = setup_admin_router(state);

        let response = app
            .oneshot(authed("GET", "/admin/stats?limit=2", Body::empty()))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["total_denials"], 3);
        assert_eq!(json["recent"].as_array().unwrap().len(), 2);
        assert_eq!(json["recent"][0]["verdict"]["reason"], "BOT");
    }

    #[tokio::test]
    async fn status_reports_mode_and_backend() {
        let app = setup_admin_router(state());
        let response = app
            .oneshot(authed("GET", "/admin/status", Body::empty()))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["mode"], "normal");
        assert_eq!(json["rate_backend"], "memory");
        assert_eq!(json["tracked_clients"], 0);
    }
}
