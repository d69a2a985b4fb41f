use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::Session;
use crate::models::ClientLookupResponse;
use crate::services::ClientService;
use crate::utils::{validate_email, ApiError, ApiResponse};

/// Lets intake pre-fill name and starting point for a returning client.
#[openapi(tag = "Clients")]
#[get("/clients/<email>")]
pub async fn lookup_client(
    db: &State<DbConn>,
    _session: Session,
    email: String,
) -> Result<Json<ApiResponse<ClientLookupResponse>>, ApiError> {
    if !validate_email(&email) {
        return Err(ApiError::bad_request("Invalid email"));
    }

    let client = ClientService::find_by_email(db, &email)
        .await
        .map_err(ApiError::database)?;

    Ok(Json(ApiResponse::success(ClientLookupResponse {
        exists: client.is_some(),
        client: client.map(Into::into),
    })))
}
