use utoipa::OpenApi;
use crate::modules::jobs::dto::{JobResponse, UploadAccepted, UploadForm};
use crate::modules::jobs::model::JobStatus;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HLS Stream Generator",
        description = "Generate adaptive HLS streams from video files"
    ),
    paths(
        crate::modules::jobs::handler::upload_video,
        crate::modules::jobs::handler::download_archive,
        crate::modules::jobs::handler::get_job,
    ),
    components(
        schemas(UploadForm, UploadAccepted, JobResponse, JobStatus)
    ),
    tags(
        (name = "Jobs", description = "Upload, transcode and download HLS packages")
    )
)]
pub struct ApiDoc;
