use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use gritwall_types::api::{
    Claims, CreateChallengeRequest, SetEvidenceRequest, UpdateChallengeRequest, UsePowerupRequest,
};
use gritwall_types::models::PowerUp;

use crate::auth::AppState;
use crate::{blocking, error_status};

pub async fn create_challenge(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChallengeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.title.is_empty() || req.title.len() > 128 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let data = state
        .engine
        .create_challenge(claims.sub, req)
        .await
        .map_err(error_status)?;

    Ok((StatusCode::CREATED, Json(data)))
}

pub async fn update_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateChallengeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let data = state
        .engine
        .update_challenge(claims.sub, challenge_id, req)
        .await
        .map_err(error_status)?;

    Ok(Json(data))
}

pub async fn get_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let data = blocking!(engine.get_challenge(challenge_id));
    Ok(Json(data))
}

pub async fn list_challenges(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let list = blocking!(engine.user_challenges(claims.sub));
    Ok(Json(list))
}

pub async fn public_challenges(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let list = blocking!(engine.public_challenges());
    Ok(Json(list))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn search_challenges(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let results = blocking!(engine.search_challenges(&query.q));
    Ok(Json(results))
}

pub async fn accept_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.accept_challenge(claims.sub, challenge_id));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reject_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.reject_challenge(claims.sub, challenge_id));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.complete_challenge(claims.sub, challenge_id));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn use_powerup(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UsePowerupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    match req.powerup {
        PowerUp::Grief => {
            // Grief needs a victim.
            let target = req.target_user_id.ok_or(StatusCode::BAD_REQUEST)?;
            blocking!(engine.use_grief(claims.sub, challenge_id, target));
        }
        PowerUp::Protec => {
            blocking!(engine.use_protec(claims.sub, challenge_id));
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_evidence(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetEvidenceRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.evidence_link.is_empty() || req.evidence_link.len() > 2048 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let engine = state.engine.clone();
    blocking!(engine.set_evidence(claims.sub, challenge_id, &req.evidence_link));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_evidence(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.clear_evidence(claims.sub, challenge_id));
    Ok(StatusCode::NO_CONTENT)
}
