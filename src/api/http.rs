//! HTTP server setup with Axum

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::messages::send_message;
use super::state::AppState;
use super::ws::ws_handler;
use crate::relay::RelayStats;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        // WebSocket endpoint
        .route("/ws", get(ws_handler))
        // Status endpoints
        .route("/health", get(health_check))
        .route("/socket-status", get(socket_status))
        // Message ingest
        .route("/api/messages/send/:id", post(send_message))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Credentialed CORS for the configured browser origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Presence relay is running"
    }))
}

#[derive(Debug, Serialize)]
struct SocketStatus {
    status: &'static str,
    #[serde(flatten)]
    stats: RelayStats,
}

/// Connection summary endpoint
async fn socket_status(State(state): State<Arc<AppState>>) -> Json<SocketStatus> {
    Json(SocketStatus {
        status: "OK",
        stats: state.relay.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{InMemoryUserDirectory, JwtVerifier};
    use crate::config::RelayConfig;
    use crate::ingest::InMemoryMessageStore;
    use crate::relay::ServerEvent;
    use crate::types::{UserId, VerifiedIdentity};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    const SECRET: &str = "test-secret-key-that-is-at-least-32-characters-long";

    struct Fixture {
        state: Arc<AppState>,
        verifier: Arc<JwtVerifier>,
        store: Arc<InMemoryMessageStore>,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserDirectory::with_users(vec![
            (UserId::new("alice"), "Alice".to_string()),
            (UserId::new("bob"), "Bob".to_string()),
        ]));
        let verifier = Arc::new(JwtVerifier::new(SECRET, users).unwrap());
        let store = Arc::new(InMemoryMessageStore::new());
        let state = Arc::new(AppState::new(
            RelayConfig::new(SECRET),
            verifier.clone(),
            store.clone(),
        ));
        Fixture {
            state,
            verifier,
            store,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(fixture().state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(body_json(response).await["status"], "OK");
    }

    #[tokio::test]
    async fn test_socket_status_counts() {
        let fx = fixture();
        let _a1 = fx.state.relay.connect(&VerifiedIdentity::new("alice", "Alice"));
        let _a2 = fx.state.relay.connect(&VerifiedIdentity::new("alice", "Alice"));
        let app = create_router(fx.state.clone());

        let response = app
            .oneshot(Request::builder().uri("/socket-status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["onlineUsers"], 1);
        assert_eq!(json["activeConnections"], 2);
    }

    #[tokio::test]
    async fn test_cors_allows_client_origin_with_credentials() {
        let app = create_router(fixture().state);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/messages/send/alice")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_send_message_requires_credential() {
        let fx = fixture();
        let app = create_router(fx.state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/messages/send/alice")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"text":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_send_message_persists_then_pushes() {
        let fx = fixture();
        let mut alice = fx.state.relay.connect(&VerifiedIdentity::new("alice", "Alice"));
        while alice.events.try_recv().is_ok() {}

        let token = fx.verifier.issue_token(&UserId::new("bob")).unwrap();
        let app = create_router(fx.state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/messages/send/alice")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::COOKIE, format!("jwt={}", token))
                    .body(Body::from(r#"{"text":"hello alice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["senderId"], "bob");
        assert_eq!(json["recipientId"], "alice");
        assert_eq!(fx.store.len(), 1);

        let envelope = alice.events.try_recv().unwrap();
        match &envelope.event {
            ServerEvent::Message(message) => {
                assert_eq!(message.sender_id, UserId::new("bob"));
                assert_eq!(message.payload["text"], "hello alice");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(alice.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_empty_message_rejected() {
        let fx = fixture();
        let token = fx.verifier.issue_token(&UserId::new("bob")).unwrap();
        let app = create_router(fx.state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/messages/send/alice")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(fx.store.is_empty());
    }
}
