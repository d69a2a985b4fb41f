use log::{info, warn};
use rocket::serde::json::Json;
use rocket::fs::TempFile;
use rocket_okapi::openapi;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::config::Config;
use crate::guards::AuthGuard;
use crate::utils::{ApiResponse, ApiError};

const DOCUMENT_DIR: &str = "documents";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn extension_from_filename(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

fn extension_from_content_type(content_type: &str) -> Option<String> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg".to_string()),
        "image/png" => Some("png".to_string()),
        "application/pdf" => Some("pdf".to_string()),
        _ => None,
    }
}

fn is_valid_document_extension(ext: &str) -> bool {
    matches!(ext, "pdf" | "jpg" | "jpeg" | "png")
}

/// Picks the stored extension from the filename, falling back to the
/// declared content type.
fn document_extension(file: &TempFile<'_>) -> Result<String, ApiError> {
    let extension = file
        .name()
        .and_then(extension_from_filename)
        .or_else(|| {
            file.content_type()
                .and_then(|ct| extension_from_content_type(&ct.to_string()))
        })
        .ok_or_else(|| {
            ApiError::bad_request("Cannot determine file type from filename or content type")
        })?;

    if !is_valid_document_extension(&extension) {
        return Err(ApiError::bad_request(format!(
            "Only PDF, JPEG, and PNG files are allowed. Received: '{}'",
            extension
        )));
    }
    Ok(extension)
}

// ============================================================================
// UPLOAD ENDPOINT
// ============================================================================

/// Stores an ID document, passport or supporting file and returns the URL to
/// reference from job payloads.
#[openapi(tag = "File Upload")]
#[post("/upload/document", data = "<file>")]
pub async fn upload_document(
    mut file: TempFile<'_>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let size = file.len();
    let limit = Config::max_upload_bytes();
    if size == 0 {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }
    if size as usize > limit {
        warn!("{} sent {} bytes, limit is {}", auth.email, size, limit);
        return Err(ApiError::payload_too_large(format!(
            "File size exceeds the {} byte limit",
            limit
        )));
    }

    let extension = document_extension(&file)?;

    let upload_dir = Path::new(&Config::upload_dir()).join(DOCUMENT_DIR);
    fs::create_dir_all(&upload_dir)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create directory: {}", e)))?;

    let filename = format!(
        "{}_{}.{}",
        Uuid::new_v4(),
        chrono::Utc::now().timestamp(),
        extension
    );

    file.persist_to(upload_dir.join(&filename))
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to save file: {}", e)))?;

    let file_url = format!("/uploads/{}/{}", DOCUMENT_DIR, filename);
    info!("{} uploaded {} ({} bytes)", auth.email, file_url, size);

    Ok(Json(ApiResponse::success_with_message(
        "Document uploaded successfully",
        serde_json::json!({
            "url": file_url,
            "filename": filename,
            "size": size,
        }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_the_filename() {
        assert_eq!(extension_from_filename("Passport.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_from_filename("scan"), None);
    }

    #[test]
    fn content_type_fills_in_missing_extensions() {
        assert_eq!(extension_from_content_type("image/jpg").as_deref(), Some("jpg"));
        assert_eq!(extension_from_content_type("text/plain"), None);
    }

    #[test]
    fn only_documents_are_accepted() {
        assert!(is_valid_document_extension("pdf"));
        assert!(is_valid_document_extension("jpeg"));
        assert!(!is_valid_document_extension("exe"));
        assert!(!is_valid_document_extension("webp"));
    }
}
