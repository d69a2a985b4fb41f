use rocket_okapi::okapi::Map;
use serde::{Deserialize, Serialize};
use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::Request;
use std::io::Cursor;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{MediaType, Response as OpenApiResponse, Responses};

use crate::services::WorkflowError;

/// -----------------------------
/// Generic API response
/// -----------------------------
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            message: Some(message),
            data: None,
        }
    }
}

/// Pagination block shared by list endpoints.
#[derive(Debug, Serialize, JsonSchema)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: u64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: u64) -> Self {
        Pagination {
            page,
            limit,
            total,
            pages: (total as f64 / limit.max(1) as f64).ceil() as i64,
        }
    }

    /// Documents to skip before `page`; `None` when the offset does not fit.
    pub fn offset(page: i64, limit: i64) -> Option<u64> {
        page.checked_sub(1)
            .and_then(|before| before.checked_mul(limit))
            .and_then(|skip| u64::try_from(skip).ok())
    }
}

/// Error message stashed on the request so the error-logging fairing can read it.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext(pub Option<String>);

/// -----------------------------
/// API Error
/// -----------------------------
#[derive(Debug, Serialize, JsonSchema)]
pub struct ApiError {
    #[schemars(skip)]
    #[serde(skip_serializing)]
    pub status: Status,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::BadRequest,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::Unauthorized,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::Forbidden,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::NotFound,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::Conflict,
            message: message.into(),
        }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::PayloadTooLarge,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::InternalServerError,
            message: message.into(),
        }
    }

    pub fn database(e: mongodb::error::Error) -> Self {
        Self::internal_error(format!("Database error: {}", e))
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::MissingFields(_) | WorkflowError::InvalidField { .. } => {
                ApiError::bad_request(message)
            }
            WorkflowError::Transition { .. }
            | WorkflowError::MissingIdDocument
            | WorkflowError::MissingEngagementLetter
            | WorkflowError::NotEditable(_) => ApiError::conflict(message),
            WorkflowError::ProtectedRole(_) => ApiError::forbidden(message),
            WorkflowError::RoleInUse { .. } => ApiError::conflict(message),
        }
    }
}

/// -----------------------------
/// Rocket Responder
/// -----------------------------
impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        req.local_cache(|| ErrorContext(Some(self.message.clone())));

        let body = serde_json::to_string(&ApiResponse::<()>::error(self.message))
            .unwrap_or_else(|_| r#"{"success":false,"message":"Internal error"}"#.to_string());

        Response::build()
            .status(self.status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// -----------------------------
/// OpenAPI integration
/// -----------------------------
impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let schema = generator.json_schema::<ApiResponse<()>>();

        let mut content = Map::new();
        content.insert(
            "application/json".to_owned(),
            MediaType {
                schema: Some(schema),
                ..Default::default()
            },
        );

        let mut responses = Responses::default();

        for (code, description) in [
            ("400", "Bad request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not found"),
            ("409", "Conflict with the job's current state"),
            ("413", "Payload too large"),
            ("500", "Internal server error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                rocket_okapi::okapi::openapi3::RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    content: content.clone(),
                    ..Default::default()
                }),
            );
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;

    #[test]
    fn workflow_errors_map_to_http_statuses() {
        let missing: ApiError = WorkflowError::MissingFields(vec!["documentID".into()]).into();
        assert_eq!(missing.status, Status::BadRequest);
        assert!(missing.message.contains("documentID"));

        let transition: ApiError = WorkflowError::Transition {
            from: JobStatus::Completed,
            to: JobStatus::Approved,
        }
        .into();
        assert_eq!(transition.status, Status::Conflict);

        let admin: ApiError = WorkflowError::ProtectedRole("Admin".into()).into();
        assert_eq!(admin.status, Status::Forbidden);
    }

    #[test]
    fn pagination_rounds_pages_up() {
        let p = Pagination::new(1, 20, 41);
        assert_eq!(p.pages, 3);
        assert_eq!(Pagination::new(1, 20, 0).pages, 0);
    }

    #[test]
    fn offset_rejects_pages_past_the_range() {
        assert_eq!(Pagination::offset(1, 20), Some(0));
        assert_eq!(Pagination::offset(3, 20), Some(40));
        assert_eq!(Pagination::offset(i64::MAX, 100), None);
        assert_eq!(Pagination::offset(i64::MIN, 20), None);
    }

    #[test]
    fn error_envelope_has_no_data() {
        let body = serde_json::to_value(ApiResponse::<()>::error("nope".into())).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "nope");
        assert!(body.get("data").is_none());
    }
}
