//! CRUD over the preset and session JSON files.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::error;

use crate::AppState;
use crate::store::{Preset, PresetPanel, SessionState};

#[derive(Debug, Deserialize)]
pub struct PresetBody {
    name: String,
    panels: Vec<PresetPanel>,
}

impl PresetBody {
    fn into_preset(self) -> Preset {
        Preset {
            name: self.name,
            panels: self.panels,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub async fn list_presets(State(state): State<AppState>) -> Json<Vec<Preset>> {
    Json(state.store.load_presets())
}

pub async fn save_preset(
    State(state): State<AppState>,
    Json(body): Json<PresetBody>,
) -> Response {
    write_result(state.store.save_preset(body.into_preset()))
}

pub async fn update_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<PresetBody>,
) -> Response {
    write_result(state.store.update_preset(&name, body.into_preset()))
}

pub async fn delete_preset(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    write_result(state.store.delete_preset(&name))
}

/// The persisted layout, or JSON `null` when none has been saved yet.
pub async fn get_session(State(state): State<AppState>) -> Json<Option<SessionState>> {
    Json(state.store.load_session())
}

fn write_result(result: anyhow::Result<()>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("preset write failed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
