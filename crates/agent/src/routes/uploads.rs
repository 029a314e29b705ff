//! Upload status endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use domain::models::{DeviceId, UploadStatus};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusList {
    pub devices: Vec<UploadStatus>,
}

/// List the upload status of every known device.
pub async fn list_uploads(State(state): State<AppState>) -> Json<UploadStatusList> {
    Json(UploadStatusList {
        devices: state.scheduler.statuses(),
    })
}

/// Upload status of a single device.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<UploadStatus>, ApiError> {
    let device_id = DeviceId::new(device_id);
    state
        .scheduler
        .status(&device_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Device {device_id} not found")))
}
