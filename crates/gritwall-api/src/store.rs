use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use gritwall_types::api::{Claims, PurchaseRequest};

use crate::auth::AppState;
use crate::blocking;

pub async fn purchase(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    blocking!(engine.buy_powerup(claims.sub, req.powerup, req.count));

    // Purchases change the inventory the client shows; hand back the profile.
    let engine = state.engine.clone();
    let profile = blocking!(engine.user_profile(claims.sub));
    Ok(Json(profile))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let engine = state.engine.clone();
    let board = blocking!(engine.global_leaderboard());
    Ok(Json(board))
}
