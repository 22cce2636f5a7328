//! Handler for the queue snapshot.

use axum::extract::State;
use axum::Json;
use renderq_queue::JobSnapshot;
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

/// Response for GET /queue.
#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub total: usize,
    /// Head first; the head is the running (or input-waiting) job.
    pub jobs: Vec<JobSnapshot>,
}

/// GET /api/v1/queue
pub async fn get_queue_status(State(state): State<AppState>) -> Json<DataResponse<QueueStatusResponse>> {
    let jobs = state.queue.snapshot();
    Json(DataResponse {
        data: QueueStatusResponse {
            total: jobs.len(),
            jobs,
        },
    })
}
