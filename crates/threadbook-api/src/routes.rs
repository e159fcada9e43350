use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;

use threadbook_types::api::{
    CloseThreadRequest, CreateThreadRequest, InviteRequest, SendMessageRequest, UpdateThreadRequest,
    VoiceTokenRequest,
};
use threadbook_types::{SpoolId, ThreadId};

use crate::error::CoreError;
use crate::middleware::{Session, require_auth};
use crate::state::AppState;

/// Full HTTP surface. Everything but `/health` requires a session token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/thread", get(list_threads))
        .route("/thread/create", post(create_thread))
        .route("/thread/update", put(update_thread))
        .route("/thread/close", put(close_thread))
        .route("/thread/invite", post(invite))
        .route("/thread/sfu/token", post(voice_token))
        .route("/thread/ws/token", get(connect_tokens))
        .route("/thread/{thread_id}/ws/token", get(thread_token))
        .route("/thread/{thread_id}/messages", get(get_messages).post(send_message))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(protected)
}

async fn health() -> &'static str {
    "ok"
}

// -- Threads --

#[derive(Debug, Deserialize)]
struct SpoolQuery {
    spool_id: SpoolId,
}

async fn list_threads(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Query(query), _): WithRejection<Query<SpoolQuery>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let threads = state.threads.get_by_spool_id(session.user_id, query.spool_id).await?;
    Ok(Json(threads))
}

async fn create_thread(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Json(req), _): WithRejection<Json<CreateThreadRequest>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let thread = state
        .threads
        .create_thread(session.user_id, req.spool_id, &req.title, &req.thread_type)
        .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

async fn update_thread(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateThreadRequest>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let thread = state
        .threads
        .update_thread(req.id, session.user_id, req.title.as_deref(), req.thread_type.as_deref())
        .await?;
    Ok(Json(thread))
}

async fn close_thread(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Json(req), _): WithRejection<Json<CloseThreadRequest>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let thread = state.threads.close_thread(req.thread_id, session.user_id).await?;
    Ok(Json(thread))
}

async fn invite(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Json(req), _): WithRejection<Json<InviteRequest>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    state
        .threads
        .invite_to_thread(session.user_id, &req.usernames, req.thread_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn voice_token(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Json(req), _): WithRejection<Json<VoiceTokenRequest>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let token = state
        .voice
        .get_voice_token(session.user_id, &session.username, req.thread_id)
        .await?;
    Ok(Json(token))
}

// -- Messages --

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

async fn get_messages(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Path(thread_id), _): WithRejection<Path<ThreadId>, CoreError>,
    WithRejection(Query(page), _): WithRejection<Query<PageQuery>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let messages = state
        .messages
        .get_messages(thread_id, session.user_id, page.limit, page.offset)
        .await?;
    Ok(Json(messages))
}

async fn send_message(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Path(thread_id), _): WithRejection<Path<ThreadId>, CoreError>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let message = state
        .messages
        .send_message(thread_id, session.user_id, &req.content, &req.payloads)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// -- Transport tokens --

#[derive(Debug, Deserialize)]
struct OptionalSpoolQuery {
    spool_id: Option<SpoolId>,
}

async fn connect_tokens(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Query(query), _): WithRejection<Query<OptionalSpoolQuery>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let tokens = match query.spool_id {
        Some(spool_id) => state.tokens.spool_tokens(session.user_id, spool_id).await?,
        None => state.tokens.user_tokens(session.user_id)?,
    };
    Ok(Json(tokens))
}

async fn thread_token(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    WithRejection(Path(thread_id), _): WithRejection<Path<ThreadId>, CoreError>,
) -> Result<impl IntoResponse, CoreError> {
    let token = state.tokens.thread_subscribe_token(session.user_id, thread_id).await?;
    Ok(Json(token))
}
