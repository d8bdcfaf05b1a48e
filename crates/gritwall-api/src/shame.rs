use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use gritwall_types::api::{Claims, ThrowItemRequest};

use crate::auth::AppState;
use crate::blocking;

pub async fn shame_list(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let wall = blocking!(engine.shame_list());
    Ok(Json(wall))
}

pub async fn throw_item(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ThrowItemRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let entry = blocking!(engine.throw_item(claims.sub, req));
    Ok(Json(entry))
}
