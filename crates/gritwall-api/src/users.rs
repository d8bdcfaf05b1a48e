use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use gritwall_types::api::{Claims, UpdateProfileRequest};

use crate::auth::AppState;
use crate::blocking;

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let profile = blocking!(engine.user_profile(claims.sub));
    Ok(Json(profile))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.name.is_empty() || req.name.len() > 64 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let engine = state.engine.clone();
    let profile = blocking!(engine.update_profile(claims.sub, req));
    Ok(Json(profile))
}
