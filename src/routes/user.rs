use log::info;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};

use crate::db::{self, DbConn, ROLES, USERS};
use crate::guards::Session;
use crate::models::{CreateUserDto, Feature, Role, UpdateUserDto, User, UserResponse};
use crate::services::PasswordService;
use crate::utils::{is_blank, normalize_email, parse_object_id, validate_email, ApiError, ApiResponse};

const MIN_PASSWORD_LEN: usize = 8;

async fn resolve_role(db: &DbConn, raw: &str) -> Result<ObjectId, ApiError> {
    let role_id = parse_object_id(raw, "role")?;
    let exists = db
        .collection::<Role>(ROLES)
        .count_documents(doc! { "_id": role_id }, None)
        .await
        .map_err(ApiError::database)?;

    if exists == 0 {
        return Err(ApiError::bad_request("Role does not exist"));
    }
    Ok(role_id)
}

async fn ensure_email_free(db: &DbConn, email: &str, except: Option<ObjectId>) -> Result<(), ApiError> {
    let mut filter = doc! { "email": email };
    if let Some(id) = except {
        filter.insert("_id", doc! { "$ne": id });
    }

    let taken = db
        .collection::<User>(USERS)
        .count_documents(filter, None)
        .await
        .map_err(ApiError::database)?;

    if taken > 0 {
        return Err(ApiError::conflict("A user with this email already exists"));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    PasswordService::hash(password)
        .map_err(|e| ApiError::internal_error(format!("Failed to hash password: {}", e)))
}

/// Lists active users; intake uses it to pick the assigned person.
#[openapi(tag = "Users")]
#[get("/users")]
pub async fn list_users(
    db: &State<DbConn>,
    _session: Session,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, ApiError> {
    let cursor = db
        .collection::<User>(USERS)
        .find(
            doc! { "isActive": true },
            FindOptions::builder().sort(doc! { "name": 1 }).build(),
        )
        .await
        .map_err(ApiError::database)?;

    let users = db::collect(cursor).await?;
    Ok(Json(ApiResponse::success(users.into_iter().map(Into::into).collect())))
}

#[openapi(tag = "Users")]
#[post("/users", data = "<dto>")]
pub async fn create_user(
    db: &State<DbConn>,
    session: Session,
    dto: Json<CreateUserDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    session.require(Feature::UserManagement)?;

    if is_blank(&dto.name) {
        return Err(ApiError::bad_request("Name is required"));
    }
    if !validate_email(&dto.email) {
        return Err(ApiError::bad_request("Invalid email"));
    }

    let email = normalize_email(&dto.email);
    ensure_email_free(db, &email, None).await?;
    let role = resolve_role(db, &dto.role).await?;
    let password_hash = hash_password(&dto.password)?;

    let now = DateTime::now();
    let mut user = User {
        id: None,
        name: dto.name.trim().to_string(),
        email,
        role: Some(role),
        password_hash,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<User>(USERS)
        .insert_one(&user, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create user: {}", e)))?;
    user.id = result.inserted_id.as_object_id();

    info!("User {} created by {}", user.email, session.user.email);
    Ok(Json(ApiResponse::success_with_message("User created", user.into())))
}

#[openapi(tag = "Users")]
#[put("/users/<user_id>", data = "<dto>")]
pub async fn update_user(
    db: &State<DbConn>,
    session: Session,
    user_id: String,
    dto: Json<UpdateUserDto>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    session.require(Feature::UserManagement)?;

    let user_id = parse_object_id(&user_id, "user")?;
    let mut update_doc = doc! { "updatedAt": DateTime::now() };

    if let Some(ref name) = dto.name {
        if is_blank(name) {
            return Err(ApiError::bad_request("Name cannot be empty"));
        }
        update_doc.insert("name", name.trim());
    }
    if let Some(ref email) = dto.email {
        if !validate_email(email) {
            return Err(ApiError::bad_request("Invalid email"));
        }
        let email = normalize_email(email);
        ensure_email_free(db, &email, Some(user_id)).await?;
        update_doc.insert("email", email);
    }
    if let Some(ref password) = dto.password {
        update_doc.insert("passwordHash", hash_password(password)?);
    }
    if let Some(ref role) = dto.role {
        update_doc.insert("role", resolve_role(db, role).await?);
    }
    if let Some(is_active) = dto.is_active {
        if !is_active && user_id == session.user_id {
            return Err(ApiError::bad_request("You cannot deactivate your own account"));
        }
        update_doc.insert("isActive", is_active);
    }

    let updated = db
        .collection::<User>(USERS)
        .find_one_and_update(
            doc! { "_id": user_id },
            doc! { "$set": update_doc },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update user: {}", e)))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success_with_message("User updated", updated.into())))
}
