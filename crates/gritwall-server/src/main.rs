use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use gritwall_api::auth::{self, AppState, AppStateInner};
use gritwall_api::middleware::require_auth;
use gritwall_api::{challenges, friends, shame, store, users, votes};
use gritwall_engine::scheduler::Scheduler;
use gritwall_engine::{Engine, EngineConfig};
use gritwall_gateway::connection;
use gritwall_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    engine: Arc<Engine>,
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gritwall=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("GRITWALL_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("GRITWALL_DB_PATH").unwrap_or_else(|_| "gritwall.db".into());
    let host = std::env::var("GRITWALL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("GRITWALL_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(gritwall_db::Database::open(&PathBuf::from(&db_path))?);

    // Engine with the gateway dispatcher as its fanout
    let dispatcher = Dispatcher::new();
    let engine = Engine::new(
        db.clone(),
        Scheduler::new(),
        Arc::new(dispatcher.clone()),
        EngineConfig::default(),
    );

    // Re-arm lifecycle timers for challenges that were in flight at shutdown
    engine.restore_jobs().await?;

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        engine: engine.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState {
        engine,
        dispatcher,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/users/me", get(users::me))
        .route("/users/me", patch(users::update_profile))
        .route("/challenges", post(challenges::create_challenge))
        .route("/challenges", get(challenges::list_challenges))
        .route("/challenges/public", get(challenges::public_challenges))
        .route("/challenges/search", get(challenges::search_challenges))
        .route("/challenges/{challenge_id}", get(challenges::get_challenge))
        .route("/challenges/{challenge_id}", patch(challenges::update_challenge))
        .route("/challenges/{challenge_id}/accept", post(challenges::accept_challenge))
        .route("/challenges/{challenge_id}/reject", post(challenges::reject_challenge))
        .route("/challenges/{challenge_id}/complete", post(challenges::complete_challenge))
        .route("/challenges/{challenge_id}/powerup", post(challenges::use_powerup))
        .route("/challenges/{challenge_id}/evidence", post(challenges::set_evidence))
        .route("/challenges/{challenge_id}/evidence", delete(challenges::clear_evidence))
        .route("/challenges/{challenge_id}/votes", post(votes::submit_vote))
        .route("/challenges/{challenge_id}/votes", get(votes::get_votes))
        .route("/friends", get(friends::list_friends))
        .route("/friends", delete(friends::unfriend))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests", get(friends::list_requests))
        .route("/friends/requests/accept", post(friends::accept_request))
        .route("/friends/requests/reject", post(friends::reject_request))
        .route("/shame", get(shame::shame_list))
        .route("/shame/throw", post(shame::throw_item))
        .route("/store/purchase", post(store::purchase))
        .route("/leaderboard", get(store::leaderboard))
        .route("/leaderboard/friends", get(friends::friend_leaderboard))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Gritwall server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.engine, state.jwt_secret)
    })
}
