use mongodb::bson::doc;
use mongodb::options::FindOptions;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::{self, DbConn, SERVICES};
use crate::guards::AuthGuard;
use crate::models::{Service, ServiceResponse};
use crate::utils::{ApiResponse, ApiError};

/// Active entries of the service catalog
#[openapi(tag = "Services")]
#[get("/services")]
pub async fn get_all_services(
    db: &State<DbConn>,
    _auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let cursor = db
        .collection::<Service>(SERVICES)
        .find(
            doc! { "isActive": { "$ne": false } },
            FindOptions::builder().sort(doc! { "name": 1 }).build(),
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    let services: Vec<ServiceResponse> = db::collect(cursor)
        .await?
        .into_iter()
        .map(ServiceResponse::from)
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "total": services.len(),
        "services": services,
    }))))
}
