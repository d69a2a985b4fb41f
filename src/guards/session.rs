use log::error;
use mongodb::bson::{doc, oid::ObjectId};
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket::State;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::db::{DbConn, ROLES, USERS};
use crate::guards::AuthGuard;
use crate::models::{Feature, Permissions, Role, Section, SessionResponse, User, UserResponse};
use crate::utils::ApiError;

/// Authenticated user with the role loaded from the database on every
/// request; all permission checks go through here.
pub struct Session {
    pub user_id: ObjectId,
    pub user: User,
    pub role: Option<Role>,
}

/// Who made the request, kept on the request for the error-logging fairing.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub name: String,
    pub role: Option<String>,
    pub permissions: Permissions,
}

impl Session {
    pub fn permissions(&self) -> Permissions {
        self.role
            .as_ref()
            .map(|r| r.permissions)
            .unwrap_or_default()
    }

    pub fn require(&self, feature: Feature) -> Result<(), ApiError> {
        if self.permissions().feature(feature) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "Your role does not grant {}",
                feature.label()
            )))
        }
    }

    pub fn require_view(&self, section: Section) -> Result<(), ApiError> {
        if self.permissions().section(section).can_view() {
            Ok(())
        } else {
            Err(ApiError::forbidden("You cannot view this section"))
        }
    }

    pub fn require_edit(&self, section: Section) -> Result<(), ApiError> {
        if self.permissions().section(section).can_edit() {
            Ok(())
        } else {
            Err(ApiError::forbidden("You cannot edit this section"))
        }
    }

    pub fn to_response(&self) -> SessionResponse {
        SessionResponse {
            user: UserResponse::from(self.user.clone()),
            role_name: self.role.as_ref().map(|r| r.name.clone()),
            permissions: self.permissions(),
        }
    }
}

async fn load(db: &DbConn, auth: &AuthGuard) -> Result<Option<(User, Option<Role>)>, mongodb::error::Error> {
    let user = db
        .collection::<User>(USERS)
        .find_one(doc! { "_id": auth.user_id, "isActive": true }, None)
        .await?;

    let Some(user) = user else { return Ok(None) };

    let role = match user.role {
        Some(role_id) => {
            db.collection::<Role>(ROLES)
                .find_one(doc! { "_id": role_id }, None)
                .await?
        }
        None => None,
    };

    Ok(Some((user, role)))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let auth = match req.guard::<AuthGuard>().await {
            Outcome::Success(auth) => auth,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        let db = match req.guard::<&State<DbConn>>().await {
            Outcome::Success(db) => db,
            _ => return Outcome::Error((Status::ServiceUnavailable, ())),
        };

        match load(db, &auth).await {
            Ok(Some((user, role))) => {
                let session = Session {
                    user_id: auth.user_id,
                    user,
                    role,
                };
                req.local_cache(|| {
                    Some(SessionSnapshot {
                        name: session.user.name.clone(),
                        role: session.role.as_ref().map(|r| r.name.clone()),
                        permissions: session.permissions(),
                    })
                });
                Outcome::Success(session)
            }
            Ok(None) => Outcome::Error((Status::Unauthorized, ())),
            Err(e) => {
                error!("Session lookup failed for {}: {}", auth.email, e);
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for Session {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::DateTime;
    use crate::models::{PermissionUpdate, SectionAccess};

    fn session_with(permissions: Option<Permissions>) -> Session {
        let now = DateTime::now();
        Session {
            user_id: ObjectId::new(),
            user: User {
                id: None,
                name: "Reviewer".into(),
                email: "reviewer@firm.example".into(),
                role: None,
                password_hash: String::new(),
                is_active: true,
                created_at: now,
                updated_at: now,
            },
            role: permissions.map(|permissions| Role {
                id: Some(ObjectId::new()),
                name: "Compliance".into(),
                description: None,
                permissions,
                created_at: now,
                updated_at: now,
            }),
        }
    }

    #[test]
    fn users_without_a_role_have_no_rights() {
        let session = session_with(None);
        assert!(session.require(Feature::JobCreation).is_err());
        assert!(session.require_view(Section::CompanyDetails).is_err());
    }

    #[test]
    fn feature_and_section_checks_follow_the_role() {
        let perms = Permissions::default().apply_all(&[
            PermissionUpdate::SetFeature { feature: Feature::ComplianceManagement, enabled: true },
            PermissionUpdate::SetSection {
                section: Section::CompanyDetails,
                editor: None,
                viewer: Some(true),
            },
        ]);
        let session = session_with(Some(perms));

        assert!(session.require(Feature::ComplianceManagement).is_ok());
        assert_eq!(
            session.require(Feature::RoleManagement).unwrap_err().status,
            Status::Forbidden
        );
        assert!(session.require_view(Section::CompanyDetails).is_ok());
        assert!(session.require_edit(Section::CompanyDetails).is_err());
        assert_eq!(session.permissions().director_details, SectionAccess::default());
    }
}
