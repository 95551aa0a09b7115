use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use bruttus_agents::{IgnoreReason, SubmitOutcome};
use bruttus_common::Message;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::state::SharedState;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// `GET /api/status`
pub async fn status(State(state): State<SharedState>) -> Json<Value> {
    let conversation = &state.conversation;
    let providers: Vec<Value> = conversation
        .provider_statuses()
        .into_iter()
        .map(|(id, status)| {
            json!({
                "id": id,
                "available": status.available,
                "tested": status.tested,
                "error": status.error,
            })
        })
        .collect();

    Json(json!({
        "phase": conversation.phase(),
        "waiting": conversation.is_waiting(),
        "pending": conversation.dispatcher().pending(),
        "scope": conversation.scope(),
        "providers": providers,
    }))
}

/// `GET /api/messages`
pub async fn list_messages(State(state): State<SharedState>) -> Json<Vec<Message>> {
    Json(state.conversation.transcript())
}

/// `POST /api/messages`
///
/// The submission runs on its own task so a client that disconnects mid-reply
/// does not abandon it; the transcript still receives the assistant message.
pub async fn send_message(
    State(state): State<SharedState>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.text.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message text is empty"));
    }

    let conversation = state.conversation.clone();
    let outcome = tokio::spawn(async move { conversation.submit(&body.text).await })
        .await
        .map_err(|e| {
            warn!("submission task failed: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "submission failed")
        })?;

    match outcome {
        SubmitOutcome::Replied(message) => Ok(Json(json!({ "message": message }))),
        SubmitOutcome::Ignored(IgnoreReason::EmptyInput) => {
            Err(api_error(StatusCode::BAD_REQUEST, "message text is empty"))
        }
        SubmitOutcome::Ignored(IgnoreReason::Busy) => Err(api_error(
            StatusCode::CONFLICT,
            "a reply is already in progress",
        )),
    }
}
