//! Channel and subscription inspection endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::{
    db::{ChannelRepository, UserRepository},
    models::{Channel, UserChannel},
    utils::AppResult,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_channels))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/{id}/channels", get(list_user_channels))
}

async fn list_channels(State(state): State<AppState>) -> AppResult<Json<Vec<Channel>>> {
    let channels = ChannelRepository::new(&state.db).list_channels().await?;
    Ok(Json(channels))
}

async fn list_user_channels(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<UserChannel>>> {
    let channels = UserRepository::new(&state.db)
        .get_user_channel_details(id)
        .await?;
    Ok(Json(channels))
}
