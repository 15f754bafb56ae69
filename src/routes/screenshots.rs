use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::models::job::ScreenshotJob;
use crate::models::screenshot::{BatchSubmitRequest, BatchSubmitResponse, SubmitRequest};
use crate::routes::error::ApiError;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::Validation(e.body_text()))
}

/// Job ids that fail to parse are reported like any unknown job.
fn job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

/// POST /api/v1/screenshots: request screenshots for one app.
pub async fn submit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScreenshotJob>), ApiError> {
    let req = body(payload)?;
    let job = state.submissions.submit(&user, &req).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// POST /api/v1/screenshots/batch: request screenshots for several apps.
pub async fn submit_batch(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<BatchSubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchSubmitResponse>), ApiError> {
    let req = body(payload)?;
    let jobs = state.submissions.submit_batch(&user, &req).await?;
    Ok((StatusCode::ACCEPTED, Json(BatchSubmitResponse { jobs })))
}

/// GET /api/v1/screenshots: the caller's jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ScreenshotJob>>, ApiError> {
    Ok(Json(state.jobs.list_owned(&user.user_id).await?))
}

/// GET /api/v1/screenshots/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Json<ScreenshotJob>, ApiError> {
    let job = state
        .jobs
        .get_owned(job_id(&raw_id)?, &user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(job))
}

/// GET /api/v1/screenshots/{job_id}/download: the finished archive.
pub async fn download(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let archive = state
        .delivery
        .download(job_id(&raw_id)?, &user.user_id)
        .await?;

    let disposition = format!("attachment; filename=\"{}\"", archive.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, archive.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}
