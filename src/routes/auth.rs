use log::{info, warn};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::doc;

use crate::config::Config;
use crate::db::{DbConn, ROLES, USERS};
use crate::guards::Session;
use crate::models::{LoginDto, LoginResponse, Role, SessionResponse, User, UserResponse};
use crate::services::{JwtService, PasswordService};
use crate::utils::{normalize_email, validate_email, ApiError, ApiResponse};

/// --------------------
/// Login
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if !validate_email(&dto.email) {
        return Err(ApiError::bad_request("Invalid email"));
    }
    let email = normalize_email(&dto.email);

    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(ApiError::database)?;

    // Same answer for unknown email, wrong password and inactive account.
    let user = match user {
        Some(user) if user.is_active && PasswordService::verify(&dto.password, &user.password_hash) => user,
        _ => {
            warn!("Failed login for {}", email);
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
    };

    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal_error("User has no id"))?;

    let role = match user.role {
        Some(role_id) => db
            .collection::<Role>(ROLES)
            .find_one(doc! { "_id": role_id }, None)
            .await
            .map_err(ApiError::database)?,
        None => None,
    };

    let token = JwtService::generate_access_token(&user_id, &user.email)
        .map_err(|e| ApiError::internal_error(format!("Failed to issue token: {}", e)))?;

    info!("{} logged in", user.email);

    Ok(Json(ApiResponse::success(LoginResponse {
        token,
        expires_in: Config::jwt_expiry(),
        session: SessionResponse {
            user: UserResponse::from(user),
            role_name: role.as_ref().map(|r| r.name.clone()),
            permissions: role.map(|r| r.permissions).unwrap_or_default(),
        },
    })))
}

/// --------------------
/// Current session
/// --------------------
#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(session: Session) -> Json<ApiResponse<SessionResponse>> {
    Json(ApiResponse::success(session.to_response()))
}
