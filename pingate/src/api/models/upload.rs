use serde::Serialize;
use utoipa::ToSchema;

/// Multipart body for `POST /upload`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// The file to store
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Multipart body for `POST /upload-multiple`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadMultipleForm {
    /// Files to store. The field may also be sent as `files[]`.
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

/// Generic error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Internal server error")]
    pub error: String,
}

/// Error body for a rejected single upload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvalidFileTypeResponse {
    #[schema(example = "Invalid file type")]
    pub error: String,
    /// Accepted file extensions
    pub allowed_types: Vec<String>,
}

/// Error body for a rejected batch upload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvalidFilesResponse {
    #[schema(example = "Invalid file types")]
    pub error: String,
    pub allowed_types: Vec<String>,
    /// Names of the files that failed the check
    pub invalid_files: Vec<String>,
}
