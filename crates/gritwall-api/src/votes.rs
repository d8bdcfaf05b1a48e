use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use gritwall_types::api::{Claims, SubmitVoteRequest};

use crate::auth::AppState;
use crate::blocking;

#[derive(Debug, Serialize)]
pub struct SubmitVoteResponse {
    /// Set when this vote crossed the veto threshold.
    pub vetoed_user_id: Option<Uuid>,
}

pub async fn submit_vote(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitVoteRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let vetoed = blocking!(engine.submit_vote(claims.sub, challenge_id, req.victim_id));

    Ok((
        StatusCode::CREATED,
        Json(SubmitVoteResponse {
            vetoed_user_id: vetoed,
        }),
    ))
}

pub async fn get_votes(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let votes = blocking!(engine.get_votes(claims.sub, challenge_id));
    Ok(Json(votes))
}
