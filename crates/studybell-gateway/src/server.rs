//! HTTP server implementation using Axum.

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use studybell_core::error::{Result, StudybellError};
use studybell_mailer::ReminderSender;
use studybell_service::{BlockService, NotificationDispatcher};

use super::auth::{AuthUser, IdentityProvider, bearer_token};

/// Shared state for the gateway server.
pub struct AppState {
    pub service: BlockService,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub sender: Arc<dyn ReminderSender>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Shared secret for the dispatcher trigger and internal send routes.
    pub cron_secret: String,
}

/// Resolve the caller from the Authorization header through the identity
/// provider.
async fn authenticate(state: &AppState, headers: &axum::http::HeaderMap) -> Result<AuthUser> {
    let token = bearer_token(headers)
        .ok_or_else(|| StudybellError::Unauthenticated("missing bearer token".into()))?;
    state.identity.resolve(token).await
}

/// Bearer auth middleware — resolves the caller through the identity
/// provider and attaches the resulting user to the request.
async fn require_user(
    State(state): State<Arc<AppState>>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    match authenticate(&state, req.headers()).await {
        Ok(user) => {
            let mut req = req;
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("auth rejected: {e}");
            axum::response::Response::builder()
                .status(axum::http::StatusCode::UNAUTHORIZED)
                .header("Content-Type", "application/json")
                .body(axum::body::Body::from(
                    serde_json::json!({ "error": e.to_string(), "kind": e.kind() }).to_string(),
                ))
                .unwrap()
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Block CRUD — requires a resolvable user token
    let protected = Router::new()
        .route(
            "/study-blocks",
            get(super::routes::list_blocks)
                .post(super::routes::create_block)
                .delete(super::routes::delete_block),
        )
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_user));

    // Dispatcher trigger + internal send — shared-secret auth in the handler
    let internal = Router::new()
        .route("/check-notifications", get(super::routes::check_notifications))
        .route("/send-notification", post(super::routes::send_notification));

    // Public — no auth
    let public = Router::new().route("/health", get(super::routes::health_check));

    protected
        .merge(internal)
        .merge(public)
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                ])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server. Runs until the process exits.
pub async fn start(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;
    use studybell_store::{BlockStore, NewStudyBlock};

    /// Records recipients; never touches a relay.
    struct RecordingSender {
        sent: Mutex<Vec<String>>,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()) }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ReminderSender for RecordingSender {
        async fn send(
            &self,
            recipient: &str,
            _subject: &str,
            _start_time: DateTime<Utc>,
        ) -> Result<String> {
            self.sent.lock().unwrap().push(recipient.to_string());
            Ok("<msg@test>".into())
        }
    }

    /// Resolves exactly one token.
    struct StaticIdentity;

    #[async_trait]
    impl IdentityProvider for StaticIdentity {
        async fn resolve(&self, token: &str) -> Result<AuthUser> {
            if token == "good-token" {
                Ok(AuthUser { id: "u1".into(), email: "u1@example.com".into() })
            } else {
                Err(StudybellError::Unauthenticated("unknown token".into()))
            }
        }
    }

    fn test_state(cron_secret: &str) -> (Arc<AppState>, Arc<RecordingSender>, Arc<BlockStore>) {
        let store = Arc::new(BlockStore::open_in_memory().unwrap());
        let sender = Arc::new(RecordingSender::new());
        let service = BlockService::new(store.clone(), chrono_tz::Tz::UTC);
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), sender.clone()));
        let state = Arc::new(AppState {
            service,
            dispatcher,
            sender: sender.clone(),
            identity: Arc::new(StaticIdentity),
            cron_secret: cron_secret.into(),
        });
        (state, sender, store)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn insert_due_block(store: &BlockStore, now: DateTime<Utc>) {
        let start = now + Duration::minutes(5);
        store
            .insert(&NewStudyBlock {
                owner_id: "u1".into(),
                owner_email: "u1@example.com".into(),
                subject: "Math".into(),
                duration_minutes: 30,
                start_time: start,
                end_time: start + Duration::minutes(30),
                notification_time: start - Duration::minutes(10),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn authenticate_rejects_missing_or_unresolvable_token() {
        let (state, _, _) = test_state("s3cret");

        let e = authenticate(&state, &HeaderMap::new()).await.unwrap_err();
        assert_eq!(e.kind(), "unauthenticated");

        let e = authenticate(&state, &bearer("bad-token")).await.unwrap_err();
        assert_eq!(e.kind(), "unauthenticated");
    }

    #[tokio::test]
    async fn authenticate_resolves_known_token() {
        let (state, _, _) = test_state("s3cret");

        let user = authenticate(&state, &bearer("good-token")).await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email, "u1@example.com");
    }

    #[tokio::test]
    async fn empty_dispatch_secret_fails_closed() {
        let (state, sender, store) = test_state("");
        insert_due_block(&store, Utc::now());

        // even a bearer matching the (empty) secret is refused
        let resp = crate::routes::check_notifications(State(state.clone()), bearer("")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = crate::routes::check_notifications(State(state), bearer("anything")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn wrong_or_missing_dispatch_secret_is_rejected() {
        let (state, sender, store) = test_state("s3cret");
        insert_due_block(&store, Utc::now());

        let resp =
            crate::routes::check_notifications(State(state.clone()), HeaderMap::new()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = crate::routes::check_notifications(State(state), bearer("wrong")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn matching_dispatch_secret_runs_the_dispatcher() {
        let (state, sender, store) = test_state("s3cret");
        insert_due_block(&store, Utc::now());

        let resp = crate::routes::check_notifications(State(state), bearer("s3cret")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], serde_json::json!(true));
        assert_eq!(body["sent"], serde_json::json!(1));
        assert_eq!(sender.sent_count(), 1);
    }
}
