//! Chat history handler.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::chat::Outcome;
use crate::web::dto::{ApiResponse, HistoryQuery, MessageResponse};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

use super::AppState;

/// GET /api/chats/:chat_id/messages - Recent messages, oldest first.
///
/// Malformed ids and chats the caller is not a member of both answer 404.
pub async fn get_chat_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Path(chat_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<MessageResponse>>>, ApiError> {
    let limit = query.limit.unwrap_or(state.history_limit);

    match state.service.history(claims.sub, &chat_id, limit).await? {
        Outcome::Applied(events) => Ok(Json(ApiResponse::new(
            events.iter().map(MessageResponse::from).collect(),
        ))),
        Outcome::Ignored(reason) => {
            tracing::debug!(user = claims.sub, reason = %reason, "History request refused");
            Err(ApiError::not_found("Chat not found"))
        }
    }
}
