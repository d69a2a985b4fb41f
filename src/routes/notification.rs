use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::doc;
use mongodb::options::FindOptions;

use crate::db::{self, DbConn, NOTIFICATIONS};
use crate::guards::AuthGuard;
use crate::models::{Notification, NotificationResponse, UnreadCountResponse};
use crate::utils::{parse_object_id, ApiError, ApiResponse};

const NOTIFICATION_PAGE: i64 = 50;

#[openapi(tag = "Notifications")]
#[get("/notifications")]
pub async fn list_notifications(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<Vec<NotificationResponse>>>, ApiError> {
    let cursor = db
        .collection::<Notification>(NOTIFICATIONS)
        .find(
            doc! { "recipient": auth.user_id },
            FindOptions::builder()
                .sort(doc! { "createdAt": -1 })
                .limit(NOTIFICATION_PAGE)
                .build(),
        )
        .await
        .map_err(ApiError::database)?;

    let notifications = db::collect(cursor).await?;
    Ok(Json(ApiResponse::success(notifications.into_iter().map(Into::into).collect())))
}

#[openapi(tag = "Notifications")]
#[get("/notifications/unread-count")]
pub async fn unread_count(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<UnreadCountResponse>>, ApiError> {
    let unread_count = db
        .collection::<Notification>(NOTIFICATIONS)
        .count_documents(doc! { "recipient": auth.user_id, "read": false }, None)
        .await
        .map_err(ApiError::database)?;

    Ok(Json(ApiResponse::success(UnreadCountResponse { unread_count })))
}

#[openapi(tag = "Notifications")]
#[put("/notifications/<notification_id>/read")]
pub async fn mark_read(
    db: &State<DbConn>,
    auth: AuthGuard,
    notification_id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let notification_id = parse_object_id(&notification_id, "notification")?;

    let result = db
        .collection::<Notification>(NOTIFICATIONS)
        .update_one(
            doc! { "_id": notification_id, "recipient": auth.user_id },
            doc! { "$set": { "read": true } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update notification: {}", e)))?;

    if result.matched_count == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(ApiResponse::success_with_message("Marked as read", ())))
}
