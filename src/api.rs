use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::ingest::latest_payload;
use crate::types::AppState;

pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Radar Weather API is running. Visit /radar for data."
    }))
}

pub async fn radar(State(state): State<AppState>) -> Response {
    match latest_payload(&state).await {
        Ok(payload) => Json(&*payload).into_response(),
        Err(error) => {
            error!("Radar pipeline failed: {error}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": error.to_string()
                })),
            )
                .into_response()
        }
    }
}
