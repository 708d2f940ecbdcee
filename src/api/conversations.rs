//! Messaging endpoints

use super::{respond, ApiState, AuthUser};
use crate::domain::{MessagePage, NewConversation, NewMessage};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{debug, info};

/// Open a conversation with another user, or return the existing one
pub async fn start_conversation(
    State(state): State<ApiState>,
    auth: AuthUser,
    Json(req): Json<NewConversation>,
) -> impl IntoResponse {
    info!(
        "API: Start conversation: user_id={}, with={}",
        auth.user.id, req.participant_id
    );
    respond(
        state.app.market.start_conversation(&auth.user, req).await,
        StatusCode::CREATED,
    )
}

/// The caller's conversations
pub async fn list_conversations(
    State(state): State<ApiState>,
    auth: AuthUser,
) -> impl IntoResponse {
    respond(state.app.market.conversations(&auth.user).await, StatusCode::OK)
}

/// A page of messages in one conversation
pub async fn conversation_messages(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
    Query(page): Query<MessagePage>,
) -> impl IntoResponse {
    debug!(
        "API: Messages: conversation_id={}, skip={}, limit={}",
        conversation_id, page.skip, page.limit
    );
    respond(
        state
            .app
            .market
            .conversation_messages(&auth.user, &conversation_id, page)
            .await,
        StatusCode::OK,
    )
}

/// Post a message
pub async fn send_message(
    State(state): State<ApiState>,
    auth: AuthUser,
    Path(conversation_id): Path<String>,
    Json(req): Json<NewMessage>,
) -> impl IntoResponse {
    info!(
        "API: Send message: conversation_id={}, user_id={}",
        conversation_id, auth.user.id
    );
    respond(
        state
            .app
            .market
            .send_message(&auth.user, &conversation_id, req)
            .await,
        StatusCode::CREATED,
    )
}
