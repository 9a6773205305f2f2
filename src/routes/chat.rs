use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::StreamExt;

use crate::{
    error::{AppError, UpstreamError},
    message::{ChatRequest, ChatResponse},
    services::session::ChatSession,
    state::SharedState,
};

/// `POST /chat`: the complete reply as `{"text": ...}`.
pub async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload?;
    tracing::debug!(history = req.history.len(), "buffered chat");

    let session = ChatSession::open(state.model.clone(), req.history);
    let text = session.send_message(&req.message).await?;

    Ok(Json(ChatResponse { text }))
}

/// `POST /stream`: reply fragments written to the body as they arrive.
///
/// A failure before the first fragment is a 500. A failure afterwards
/// aborts the body, leaving the chunked response unterminated.
pub async fn stream_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = payload?;
    tracing::debug!(history = req.history.len(), "streaming chat");

    let session = ChatSession::open(state.model.clone(), req.history);
    let fragments = session
        .send_message_stream(&req.message, state.shutdown.child_token())
        .await?;

    let cancel = fragments.cancellation_token().clone();
    let body = async_stream::stream! {
        let mut fragments = fragments;
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => yield Ok(Bytes::from(text)),
                Err(e) => {
                    tracing::error!(error = %e, "upstream stream failed, aborting response");
                    yield Err(e);
                    return;
                }
            }
        }
        // Ended by shutdown rather than by the upstream: still incomplete.
        if cancel.is_cancelled() {
            tracing::warn!("stream cancelled before completion");
            yield Err(UpstreamError::Cancelled);
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}
