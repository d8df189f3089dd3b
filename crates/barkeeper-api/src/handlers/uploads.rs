use axum::Json;
use barkeeper_core::AcceptedFile;
use serde::Serialize;

use crate::middleware::UploadedFiles;

#[derive(Debug, Serialize)]
pub struct UploadsResponse {
    pub files: Vec<AcceptedFile>,
    pub count: usize,
}

/// Echo the files accepted by the upload middleware.
pub async fn accept_uploads(uploaded: UploadedFiles) -> Json<UploadsResponse> {
    Json(UploadsResponse {
        files: uploaded.files().to_vec(),
        count: uploaded.len(),
    })
}
