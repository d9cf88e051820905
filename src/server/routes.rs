/// REST routes for logseal.
///
/// Request bodies are plaintext logs. They go straight into a `Plaintext`
/// buffer and from there to the pipeline; nothing here logs or echoes them.
use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::LengthLimitError;
use serde::Serialize;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use super::AppState;
use crate::crypto::sensitive::Plaintext;
use crate::pipeline::{ResponseBody, IDENTIFIER_PARAM};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

// ─── Health ──────────────────────────────────────────────

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

// ─── Upload ──────────────────────────────────────────────

fn with_request_id(request_id: Uuid, status: StatusCode, body: ResponseBody) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// POST /upload?minion=<id>: seal the body and store it under the identifier.
async fn upload(
    State(state): State<Arc<AppState>>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
    body: Body,
) -> Response {
    let request_id = Uuid::now_v7();
    let span = info_span!("upload", %request_id);

    async move {
        let bytes = match to_bytes(body, state.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let too_large = e.into_inner().is::<LengthLimitError>();
                return if too_large {
                    warn!(limit = state.max_body_bytes, "Request body over limit");
                    with_request_id(
                        request_id,
                        StatusCode::PAYLOAD_TOO_LARGE,
                        ResponseBody::Error {
                            error: "Payload too large",
                        },
                    )
                } else {
                    warn!("Request body could not be read");
                    with_request_id(
                        request_id,
                        StatusCode::BAD_REQUEST,
                        ResponseBody::Error {
                            error: "Could not read request body",
                        },
                    )
                };
            }
        };

        // Wipe coverage starts here; hyper's receive buffers are freed unwiped.
        let minion = params
            .ok()
            .and_then(|Query(mut p)| p.remove(IDENTIFIER_PARAM));
        let payload = Plaintext::from(Vec::from(bytes));
        let outcome = state.pipeline.process(minion.as_deref(), payload).await;

        with_request_id(request_id, outcome.status(), outcome.body())
    }
    .instrument(span)
    .await
}

pub fn upload_routes() -> Router<Arc<AppState>> {
    Router::new().route("/upload", post(upload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression;
    use crate::crypto::envelope;
    use crate::engine::{EncryptionEngine, DEFAULT_CHUNKED_THRESHOLD};
    use crate::keyring::Keyring;
    use crate::pipeline::Pipeline;
    use crate::publisher::ArtifactPublisher;
    use crate::server::build_app;
    use crate::storage::memory::MemoryStore;
    use crate::storage::{StorageKey, StorageLocation};
    use axum::http::Request;
    use rand::rngs::OsRng;
    use tower::ServiceExt;
    use x25519_dalek::{PublicKey, StaticSecret};

    struct TestApp {
        app: Router,
        store: Arc<MemoryStore>,
        secret: StaticSecret,
        location: StorageLocation,
    }

    fn test_app(max_body_bytes: usize) -> TestApp {
        let secret = StaticSecret::random_from_rng(OsRng);
        let ring =
            Keyring::from_entries([("ops@example.com".to_string(), PublicKey::from(&secret))])
                .unwrap();
        let store = Arc::new(MemoryStore::new());
        let location = StorageLocation::new("logs", None);
        let pipeline = Pipeline::new(
            EncryptionEngine::new(Arc::new(ring), DEFAULT_CHUNKED_THRESHOLD),
            ArtifactPublisher::new(store.clone(), location.clone()),
            "ops@example.com".to_string(),
        );
        let app = build_app(AppState {
            pipeline: Arc::new(pipeline),
            max_body_bytes,
        });
        TestApp {
            app,
            store,
            secret,
            location,
        }
    }

    fn post_upload(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/octet-stream")
            .body(body.into())
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let t = test_app(1024);
        let response = t
            .app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_upload_created_and_stored_sealed() {
        let t = test_app(1024 * 1024);
        let log = b"Oct 17 11:22:33 web-01 sshd[42]: Accepted publickey\n".repeat(10);

        let response = t
            .app
            .oneshot(post_upload("/upload?minion=web-01", log.clone()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(json_body(response).await["message"], "File created");

        let key = StorageKey::derive(&t.location, "web-01").unwrap();
        let sealed = t.store.get(&t.location, &key).unwrap();
        assert!(!sealed.windows(20).any(|w| log.windows(20).any(|l| l == w)));

        let compressed = envelope::open(&t.secret, &sealed).unwrap();
        assert_eq!(compression::decompress(&compressed).unwrap(), log);
    }

    #[tokio::test]
    async fn test_unrelated_query_params_ignored() {
        let t = test_app(1024);
        let response = t
            .app
            .oneshot(post_upload("/upload?source=syslog&minion=db-02", "line"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let key = StorageKey::derive(&t.location, "db-02").unwrap();
        assert!(t.store.get(&t.location, &key).is_some());
    }

    #[tokio::test]
    async fn test_empty_body_is_bad_request() {
        let t = test_app(1024);
        let response = t
            .app
            .oneshot(post_upload("/upload?minion=web-01", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "No post data found!");
        assert_eq!(t.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_minion_is_bad_request() {
        let t = test_app(1024);
        let response = t
            .app
            .oneshot(post_upload("/upload", "some log line"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Missing param: minion");
        assert_eq!(t.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_minion_is_bad_request() {
        let t = test_app(1024);
        let response = t
            .app
            .oneshot(post_upload("/upload?minion=..%2Fsecrets", "x"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid param: minion");
        assert_eq!(t.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let t = test_app(16);
        let response = t
            .app
            .oneshot(post_upload("/upload?minion=web-01", vec![b'a'; 64]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["error"], "Payload too large");
        assert_eq!(t.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_get_upload_not_allowed() {
        let t = test_app(1024);
        let response = t
            .app
            .oneshot(
                Request::get("/upload?minion=web-01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
