//! Pipeline status handler

use axum::extract::State;
use axum::Json;

use crate::status::{PipelineStatus, SharedStatus};

pub async fn snapshot(State(status): State<SharedStatus>) -> Json<PipelineStatus> {
    Json(status.snapshot())
}
