use serde::{Deserialize, Serialize};

/// Queue message handed from the upload handler to the transcoder workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub job_id: String,
}
