use super::dto::{JobResponse, UploadAccepted, UploadForm};
use super::service::{Delivery, JobService, StoredUpload, Submission};
use crate::common::error::JobError;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{stream, StreamExt};
use tokio_util::io::ReaderStream;
use tracing::debug;
use validator::Validate;

/// Upload a source video
/// Sync mode answers with the finished archive, async mode with a job id.
#[utoipa::path(
    post,
    path = "/api/v1/upload",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Archive of the generated HLS package", content_type = "application/zip"),
        (status = 202, description = "Upload accepted", body = ApiResponse<UploadAccepted>),
        (status = 400, description = "Bad Request"),
        (status = 413, description = "Upload too large"),
        (status = 422, description = "Encoding failed"),
        (status = 503, description = "Queue full"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Jobs"
)]
pub async fn upload_video(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut form = UploadForm::default();
    let mut stored: Option<StoredUpload> = None;

    let received = read_upload(&state, &mut multipart, &mut form, &mut stored).await;
    let upload = match (received, stored) {
        (Ok(()), Some(upload)) => upload,
        (Ok(()), None) => {
            return ApiError("No video field found in multipart request".to_string(), StatusCode::BAD_REQUEST)
                .into_response();
        }
        (Err(e), upload) => {
            if let Some(upload) = upload {
                JobService::discard_upload(&state, &upload).await;
            }
            return e.into_response();
        }
    };

    match JobService::submit(&state, upload, &form).await {
        Ok(Submission::Archive { job_id, file_name }) => archive_response(&state, &job_id, &file_name).await,
        Ok(Submission::Queued(ack)) => ApiSuccess(
            ApiResponse::success(ack, "Upload accepted, processing in background"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Text fields are only honoured when they arrive before `video`, or are
/// re-checked after the loop; anything received is tracked in `stored` so
/// the caller can discard it on error.
async fn read_upload(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut UploadForm,
    stored: &mut Option<StoredUpload>,
) -> Result<(), ApiError> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::from(JobError::PayloadTooLarge);
        }
        ApiError(format!("Malformed multipart body: {}", e), StatusCode::BAD_REQUEST)
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "email" => form.email = non_empty(field.text().await.map_err(malformed)?),
            "profile" => form.profile = non_empty(field.text().await.map_err(malformed)?),
            "video" => {
                if stored.is_some() {
                    return Err(ApiError("Only one video per upload".to_string(), StatusCode::BAD_REQUEST));
                }
                validate_form(state, form)?;

                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError("Video part has no file name".to_string(), StatusCode::BAD_REQUEST))?;
                *stored = Some(JobService::receive_upload(state, field, &file_name).await?);
            }
            _ => debug!("Ignoring multipart field `{}`", name),
        }
    }

    validate_form(state, form)
}

fn validate_form(state: &AppState, form: &UploadForm) -> Result<(), ApiError> {
    form.validate()
        .map_err(|e| ApiError(e.to_string(), StatusCode::BAD_REQUEST))?;
    JobService::resolve_profiles(state, form.profile.as_deref())?;
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Download a generated archive
#[utoipa::path(
    get,
    path = "/api/v1/download/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Archive", content_type = "application/zip"),
        (status = 404, description = "Archive not found or expired")
    ),
    tag = "Jobs"
)]
pub async fn download_archive(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let stem = state
        .jobs
        .get(&id)
        .await
        .map(|j| j.original_stem)
        .unwrap_or_else(|| id.clone());
    archive_response(&state, &id, &format!("{}.zip", stem)).await
}

/// Get job status
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job snapshot", body = ApiResponse<JobResponse>),
        (status = 404, description = "Job not found")
    ),
    tag = "Jobs"
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match JobService::get_job(&state, &id).await {
        Ok(job) => ApiSuccess(ApiResponse::success(job, "Job retrieved successfully"), StatusCode::OK).into_response(),
        Err(_) => ApiError("Job not found".to_string(), StatusCode::NOT_FOUND).into_response(),
    }
}

/// Streams the archive while holding the job lock. Once the last byte has
/// been handed over the delivery is recorded and the lock released; a client
/// that disconnects early just drops the lock.
async fn archive_response(state: &AppState, job_id: &str, file_name: &str) -> Response {
    let Delivery { file, len, guard } = match JobService::open_archive(state, job_id).await {
        Ok(delivery) => delivery,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let state = state.clone();
    let id = job_id.to_string();
    let finish = stream::once(async move {
        JobService::complete_delivery(&state, &id).await;
        drop(guard);
        state.locks.release(&id);
        Ok::<_, std::io::Error>(Bytes::new())
    });

    let body = Body::from_stream(ReaderStream::new(file).chain(finish));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        )
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
