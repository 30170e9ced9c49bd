//! Service statistics endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{
    db::{ChannelRepository, UserRepository},
    utils::{AppError, AppResult},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub users: i64,
    pub channels: i64,
    pub collections: usize,
    pub vector_backend: &'static str,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(get_stats))
}

async fn get_stats(State(state): State<AppState>) -> AppResult<Json<StatsResponse>> {
    let users = UserRepository::new(&state.db).count().await?;
    let channels = ChannelRepository::new(&state.db).count().await?;
    let collections = state
        .vector_store
        .list_collections()
        .await
        .map_err(|e| AppError::VectorStore(format!("{:#}", e)))?
        .len();

    Ok(Json(StatsResponse {
        users,
        channels,
        collections,
        vector_backend: state.vector_store.backend(),
    }))
}
