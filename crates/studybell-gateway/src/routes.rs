//! API route handlers for the gateway.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;

use studybell_core::error::StudybellError;
use studybell_service::CreateBlock;

use super::auth::{AuthUser, bearer_token};
use super::server::AppState;

fn status_for(e: &StudybellError) -> StatusCode {
    match e {
        StudybellError::InvalidInput(_) | StudybellError::TooSoon(_) => StatusCode::BAD_REQUEST,
        StudybellError::Conflict(_) => StatusCode::CONFLICT,
        StudybellError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        StudybellError::NotFound(_) => StatusCode::NOT_FOUND,
        StudybellError::Send(_) | StudybellError::Store(_) | StudybellError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(e: &StudybellError) -> Response {
    (status_for(e), Json(json!({ "error": e.to_string(), "kind": e.kind() }))).into_response()
}

/// Health check endpoint.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "studybell",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Study block CRUD ──────────────────────────────

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlockBody {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub start_time: String,
    /// Minutes; clients send either a number or a numeric string.
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default)]
    pub custom_duration: Option<Value>,
    #[serde(default)]
    pub use_custom_time: bool,
}

/// Minutes from a JSON number or numeric string.
fn parse_minutes(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub async fn create_block(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateBlockBody>,
) -> Response {
    let minutes = if body.use_custom_time {
        parse_minutes(body.custom_duration.as_ref())
    } else {
        parse_minutes(body.duration.as_ref())
    };
    let Some(duration_minutes) = minutes else {
        return error_response(&StudybellError::InvalidInput(
            "duration must be a whole number of minutes".into(),
        ));
    };

    let request = CreateBlock {
        subject: body.subject,
        date: body.date,
        start_time: body.start_time,
        duration_minutes,
    };
    match state.service.create_block(&user.id, &user.email, &request) {
        Ok(id) => Json(json!({ "success": true, "id": id })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    match state.service.list_blocks(&user.id) {
        Ok(blocks) => Json(json!({ "blocks": blocks })).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBlockBody {
    #[serde(default)]
    pub block_id: String,
}

pub async fn delete_block(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<DeleteBlockBody>,
) -> Response {
    if body.block_id.is_empty() {
        return error_response(&StudybellError::InvalidInput("blockId is required".into()));
    }
    match state.service.delete_block(&user.id, &body.block_id) {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── Dispatcher trigger + internal send ──────────────────────────────

/// The dispatcher routes trust only the shared secret; no host-based trust.
fn check_cron_auth(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    if state.cron_secret.is_empty() {
        return Err(error_response(&StudybellError::Unauthenticated(
            "dispatcher secret is not configured".into(),
        )));
    }
    match bearer_token(headers) {
        Some(token) if token == state.cron_secret => Ok(()),
        _ => Err(error_response(&StudybellError::Unauthenticated(
            "invalid or missing dispatcher secret".into(),
        ))),
    }
}

/// One dispatcher run, triggered by the external scheduler.
pub async fn check_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = check_cron_auth(&state, &headers) {
        return resp;
    }

    match state.dispatcher.run(Utc::now()).await {
        Ok(summary) => match serde_json::to_value(&summary) {
            Ok(mut body) => {
                if let Some(obj) = body.as_object_mut() {
                    obj.insert("success".into(), json!(true));
                }
                Json(body).into_response()
            }
            Err(e) => error_response(&StudybellError::Store(format!("summary encoding: {e}"))),
        },
        Err(e) => error_response(&e),
    }
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationBody {
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub start_time: String,
}

/// Internal: send a single reminder without touching the store.
pub async fn send_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendNotificationBody>,
) -> Response {
    if let Err(resp) = check_cron_auth(&state, &headers) {
        return resp;
    }

    if body.user_email.is_empty() || body.subject.is_empty() || body.start_time.is_empty() {
        return error_response(&StudybellError::InvalidInput(
            "userEmail, subject and startTime are required".into(),
        ));
    }
    let start_time = match DateTime::parse_from_rfc3339(&body.start_time) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => {
            return error_response(&StudybellError::InvalidInput(
                "startTime must be an RFC 3339 timestamp".into(),
            ));
        }
    };

    match state.sender.send(&body.user_email, &body.subject, start_time).await {
        Ok(message_id) => {
            Json(json!({ "success": true, "messageId": message_id })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        assert_eq!(status_for(&StudybellError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&StudybellError::TooSoon("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&StudybellError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&StudybellError::Unauthenticated("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_for(&StudybellError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&StudybellError::Send("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&StudybellError::Store("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn parses_duration_from_number_or_string() {
        assert_eq!(parse_minutes(Some(&json!(30))), Some(30));
        assert_eq!(parse_minutes(Some(&json!("45"))), Some(45));
        assert_eq!(parse_minutes(Some(&json!(" 45 "))), Some(45));
        assert_eq!(parse_minutes(Some(&json!("abc"))), None);
        assert_eq!(parse_minutes(Some(&json!(-5))), None);
        assert_eq!(parse_minutes(Some(&json!(30.5))), None);
        assert_eq!(parse_minutes(None), None);
    }
}
