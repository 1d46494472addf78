use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use partsage_agent::{AgentRuntime, CancellationToken, ChatReply, ChatRequest};
use partsage_core::errors::InterfaceError;
use tracing::error;
use uuid::Uuid;

use crate::api::ApiError;

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/api/chat", post(chat)).with_state(ChatState { runtime })
}

/// Runs the request on its own task. If the client goes away axum drops this
/// future, the guard fires, and the loop stops at its next cycle boundary.
pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let Json(request) = payload.map_err(|rejection| InterfaceError::BadRequest {
        message: rejection.body_text(),
        correlation_id: correlation_id.clone(),
    })?;

    let cancel = CancellationToken::new();
    let guard = cancel.drop_guard();
    let runtime = Arc::clone(&state.runtime);
    let task = tokio::spawn(async move { runtime.handle_message(request, &cancel).await });

    let joined = task.await;
    guard.disarm();

    match joined {
        Ok(Ok(reply)) => Ok(Json(reply)),
        Ok(Err(failure)) => Err(ApiError(failure.into_interface(correlation_id))),
        Err(join_error) => {
            error!(
                event_name = "chat.request.panicked",
                correlation_id = %correlation_id,
                error = %join_error,
                "chat task did not complete"
            );
            Err(ApiError(InterfaceError::Internal {
                message: join_error.to_string(),
                correlation_id,
            }))
        }
    }
}
