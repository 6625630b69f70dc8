use super::model::{Job, JobStatus};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use utoipa::ToSchema;
use validator::Validate;

/// Text fields that may accompany the `video` part of an upload.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UploadForm {
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 32, message = "Profile selector must not be empty"))]
    pub profile: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub download_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    pub id: String,
    pub status: JobStatus,
    pub created_at: String,
    pub error: Option<String>,
    pub profiles: Vec<String>,
    pub download_url: Option<String>,
}

impl JobResponse {
    pub fn from_job(job: &Job, download_url: String) -> Self {
        let downloadable = matches!(job.status, JobStatus::Ready | JobStatus::Delivered);
        Self {
            id: job.id.clone(),
            status: job.status,
            created_at: job.created_at.format(&Rfc3339).unwrap_or_default(),
            error: job.error.clone(),
            profiles: job.profiles.iter().map(|p| p.name.clone()).collect(),
            download_url: downloadable.then_some(download_url),
        }
    }
}
