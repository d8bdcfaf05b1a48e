use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use gritwall_types::api::{Claims, FriendRequestBody};

use crate::auth::AppState;
use crate::blocking;

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FriendRequestBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.send_friend_request(claims.sub, req.user_id));
    Ok(StatusCode::CREATED)
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let pending = blocking!(engine.pending_friend_requests(claims.sub));
    Ok(Json(pending))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FriendRequestBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.accept_friend_request(claims.sub, req.user_id));
    Ok(StatusCode::NO_CONTENT)
}

/// Covers both rejecting a pending request and unfriending: either way the
/// edges between the two users go away.
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FriendRequestBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.remove_contact(claims.sub, req.user_id));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let friends = blocking!(engine.friends_list(claims.sub));
    Ok(Json(friends))
}

pub async fn unfriend(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FriendRequestBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.remove_contact(claims.sub, req.user_id));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn friend_leaderboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let board = blocking!(engine.friend_leaderboard(claims.sub));
    Ok(Json(board))
}
