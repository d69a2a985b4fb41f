use log::{info, warn};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};

use crate::db::{self, DbConn, ROLES, USERS};
use crate::guards::Session;
use crate::models::{Feature, Role, RoleDto, RoleResponse, UpdatePermissionsDto, User};
use crate::services::workflow;
use crate::utils::{parse_object_id, ApiError, ApiResponse};

async fn find_role(db: &DbConn, role_id: ObjectId) -> Result<Role, ApiError> {
    db.collection::<Role>(ROLES)
        .find_one(doc! { "_id": role_id }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Role not found"))
}

async fn ensure_name_free(db: &DbConn, name: &str, except: Option<ObjectId>) -> Result<(), ApiError> {
    let mut filter = doc! { "name": name };
    if let Some(id) = except {
        filter.insert("_id", doc! { "$ne": id });
    }

    let taken = db
        .collection::<Role>(ROLES)
        .count_documents(filter, None)
        .await
        .map_err(ApiError::database)?;

    if taken > 0 {
        return Err(ApiError::conflict(format!("A role named '{}' already exists", name)));
    }
    Ok(())
}

/// Blank descriptions are stored as absent.
fn clean_description(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|d| !d.is_empty()).map(str::to_string)
}

fn assigned_users(role_id: ObjectId) -> Document {
    doc! { "role": role_id }
}

async fn count_assigned(db: &DbConn, role_id: ObjectId) -> Result<u64, ApiError> {
    db.collection::<User>(USERS)
        .count_documents(assigned_users(role_id), None)
        .await
        .map_err(ApiError::database)
}

fn encode_permissions(role: &RoleDto) -> Result<mongodb::bson::Bson, ApiError> {
    to_bson(&role.permissions)
        .map_err(|e| ApiError::internal_error(format!("Failed to encode permissions: {}", e)))
}

#[openapi(tag = "Roles")]
#[get("/roles")]
pub async fn list_roles(
    db: &State<DbConn>,
    _session: Session,
) -> Result<Json<ApiResponse<Vec<RoleResponse>>>, ApiError> {
    let cursor = db
        .collection::<Role>(ROLES)
        .find(None, FindOptions::builder().sort(doc! { "name": 1 }).build())
        .await
        .map_err(ApiError::database)?;

    let roles = db::collect(cursor).await?;
    Ok(Json(ApiResponse::success(roles.into_iter().map(Into::into).collect())))
}

#[openapi(tag = "Roles")]
#[get("/roles/<role_id>")]
pub async fn get_role(
    db: &State<DbConn>,
    _session: Session,
    role_id: String,
) -> Result<Json<ApiResponse<RoleResponse>>, ApiError> {
    let role = find_role(db, parse_object_id(&role_id, "role")?).await?;
    Ok(Json(ApiResponse::success(role.into())))
}

#[openapi(tag = "Roles")]
#[post("/roles", data = "<dto>")]
pub async fn create_role(
    db: &State<DbConn>,
    session: Session,
    dto: Json<RoleDto>,
) -> Result<Json<ApiResponse<RoleResponse>>, ApiError> {
    session.require(Feature::RoleManagement)?;

    let name = dto.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Role name is required"));
    }
    ensure_name_free(db, name, None).await?;

    let now = DateTime::now();
    let mut role = Role {
        id: None,
        name: name.to_string(),
        description: clean_description(dto.description.as_deref()),
        permissions: dto.permissions,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .collection::<Role>(ROLES)
        .insert_one(&role, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create role: {}", e)))?;
    role.id = result.inserted_id.as_object_id();

    info!("Role '{}' created by {}", role.name, session.user.email);
    Ok(Json(ApiResponse::success_with_message("Role created", role.into())))
}

#[openapi(tag = "Roles")]
#[put("/roles/<role_id>", data = "<dto>")]
pub async fn update_role(
    db: &State<DbConn>,
    session: Session,
    role_id: String,
    dto: Json<RoleDto>,
) -> Result<Json<ApiResponse<RoleResponse>>, ApiError> {
    session.require(Feature::RoleManagement)?;

    let role_id = parse_object_id(&role_id, "role")?;
    let existing = find_role(db, role_id).await?;

    let name = dto.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Role name is required"));
    }
    if existing.is_protected() && name != existing.name {
        return Err(ApiError::forbidden(format!("The {} role cannot be renamed", existing.name)));
    }
    ensure_name_free(db, name, Some(role_id)).await?;

    let updated = db
        .collection::<Role>(ROLES)
        .find_one_and_update(
            doc! { "_id": role_id },
            doc! {
                "$set": {
                    "name": name,
                    "description": clean_description(dto.description.as_deref()),
                    "permissions": encode_permissions(&dto)?,
                    "updatedAt": DateTime::now(),
                }
            },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update role: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Role not found"))?;

    Ok(Json(ApiResponse::success_with_message("Role updated", updated.into())))
}

/// Applies permission edits in order on top of the stored matrix.
#[openapi(tag = "Roles")]
#[patch("/roles/<role_id>/permissions", data = "<dto>")]
pub async fn update_role_permissions(
    db: &State<DbConn>,
    session: Session,
    role_id: String,
    dto: Json<UpdatePermissionsDto>,
) -> Result<Json<ApiResponse<RoleResponse>>, ApiError> {
    session.require(Feature::RoleManagement)?;

    let role_id = parse_object_id(&role_id, "role")?;
    let role = find_role(db, role_id).await?;
    let permissions = role.permissions.apply_all(&dto.updates);
    let encoded = to_bson(&permissions)
        .map_err(|e| ApiError::internal_error(format!("Failed to encode permissions: {}", e)))?;

    let updated = db
        .collection::<Role>(ROLES)
        .find_one_and_update(
            doc! { "_id": role_id },
            doc! { "$set": { "permissions": encoded, "updatedAt": DateTime::now() } },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update role: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Role not found"))?;

    info!(
        "Role '{}' permissions changed ({} edit(s)) by {}",
        updated.name,
        dto.updates.len(),
        session.user.email
    );
    Ok(Json(ApiResponse::success_with_message("Permissions updated", updated.into())))
}

#[openapi(tag = "Roles")]
#[delete("/roles/<role_id>")]
pub async fn delete_role(
    db: &State<DbConn>,
    session: Session,
    role_id: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    session.require(Feature::RoleManagement)?;

    let role_id = parse_object_id(&role_id, "role")?;
    let role = find_role(db, role_id).await?;

    let assigned = count_assigned(db, role_id).await?;
    workflow::ensure_role_deletable(&role, assigned)?;

    let roles = db.collection::<Role>(ROLES);
    roles
        .delete_one(doc! { "_id": role_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to delete role: {}", e)))?;

    // A user may have been given the role between the count and the delete.
    let late = count_assigned(db, role_id).await?;
    if late > 0 {
        warn!(
            "Role '{}' was assigned to {} user(s) while being deleted; restoring it",
            role.name, late
        );
        roles
            .insert_one(&role, None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Failed to restore role: {}", e)))?;
        workflow::ensure_role_deletable(&role, late)?;
    }

    info!("Role '{}' deleted by {}", role.name, session.user.email);
    Ok(Json(ApiResponse::success_with_message("Role deleted", ())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_descriptions_are_dropped() {
        assert_eq!(clean_description(Some("   ")), None);
        assert_eq!(clean_description(None), None);
        assert_eq!(clean_description(Some(" Reviews KYC ")).as_deref(), Some("Reviews KYC"));
    }

    #[test]
    fn assignment_count_matches_on_the_role_reference() {
        let id = ObjectId::new();
        assert_eq!(assigned_users(id), doc! { "role": id });
    }

    #[test]
    fn late_assignment_refuses_the_delete() {
        let now = DateTime::now();
        let role = Role {
            id: Some(ObjectId::new()),
            name: "Reviewer".into(),
            description: None,
            permissions: Default::default(),
            created_at: now,
            updated_at: now,
        };
        let err: ApiError = workflow::ensure_role_deletable(&role, 1).unwrap_err().into();
        assert_eq!(err.status, rocket::http::Status::Conflict);
        assert!(err.message.contains("Reviewer"));
    }
}
