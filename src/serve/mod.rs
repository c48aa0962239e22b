//! HTTP serving layer
//!
//! Small axum API in front of the store and a loaded model:
//! `GET /players` lists every known player with their latest team and
//! position, `POST /predict` scores an upcoming fixture between two
//! rosters. Prediction reruns the real feature pipeline per request, so
//! served features always agree with training-time features.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use burn::backend::NdArray;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::data::PlayerStore;
use crate::features::assemble::{TARGET_TEAM_A_GOALS, TARGET_TEAM_B_GOALS};
use crate::features::pipeline::build_fixture_row;
use crate::model::GoalPredictor;
use crate::{Config, Position, Result, XgoalsError};

/// Inference backend for the server
pub type ServeBackend = NdArray<f32>;

#[derive(Clone)]
pub struct AppState {
    pub store: PlayerStore,
    pub predictor: Arc<GoalPredictor<ServeBackend>>,
    pub window_size: usize,
    pub positions: Vec<Position>,
}

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub team_a_players: Vec<String>,
    pub team_b_players: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MatchResponse {
    pub team_a_expected_goals: i64,
    pub team_b_expected_goals: i64,
}

#[derive(Debug, Serialize)]
struct PlayersResponse {
    players: Vec<crate::data::database::PlayerInfo>,
}

/// Build the axum router
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/players", get(players_handler))
        .route("/predict", post(predict_handler))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// GET /players
async fn players_handler(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<impl IntoResponse, (StatusCode, String)> {
    state
        .store
        .latest_players()
        .map(|players| Json(PlayersResponse { players }))
        .map_err(error_response)
}

/// POST /predict
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MatchRequest>,
) -> std::result::Result<impl IntoResponse, (StatusCode, String)> {
    predict_fixture(&state, &request)
        .map(Json)
        .map_err(error_response)
}

/// Run the full pipeline for one fixture and score it
fn predict_fixture(state: &AppState, request: &MatchRequest) -> Result<MatchResponse> {
    let mut all_players = request.team_a_players.clone();
    all_players.extend(request.team_b_players.iter().cloned());
    let set = state.store.get_for_players(&all_players)?;

    let features = build_fixture_row(
        &set,
        &request.team_a_players,
        &request.team_b_players,
        state.window_size,
        &state.positions,
    )?;
    let predictions = state.predictor.predict(&features)?;

    let manifest = state.predictor.manifest();
    let goals_for = |target: &str| -> Result<i64> {
        let idx = manifest.target_index(target)?;
        // Goals are whole and non-negative
        Ok(predictions[0][idx].round().max(0.0) as i64)
    };

    Ok(MatchResponse {
        team_a_expected_goals: goals_for(TARGET_TEAM_A_GOALS)?,
        team_b_expected_goals: goals_for(TARGET_TEAM_B_GOALS)?,
    })
}

fn error_response(err: XgoalsError) -> (StatusCode, String) {
    let status = match &err {
        XgoalsError::NoHistory => StatusCode::NOT_FOUND,
        XgoalsError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("request failed: {}", err);
    }
    (status, err.to_string())
}

/// Load the model and serve the API until interrupted
pub async fn serve(config: &Config, store: PlayerStore) -> Result<()> {
    let predictor = GoalPredictor::<ServeBackend>::load(&config.data.model_dir, Default::default())?;
    log::info!(
        "loaded model with {} feature columns",
        predictor.manifest().feature_columns.len()
    );

    let state = AppState {
        store,
        predictor: Arc::new(predictor),
        window_size: config.pipeline.window_size,
        positions: config.pipeline.positions.clone(),
    };
    let app = router(state, &config.server.allowed_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", addr);
    axum::serve(listener, app)
        .await
        .map_err(XgoalsError::Io)?;
    Ok(())
}
