use mongodb::bson::oid::ObjectId;
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::services::JwtService;

/// Identity proven by a `Bearer` access token. Carries no permissions; use
/// `Session` where the role matters.
pub struct AuthGuard {
    pub user_id: ObjectId,
    pub email: String,
}

impl AuthGuard {
    fn from_header(header: &str) -> Option<AuthGuard> {
        let token = header.strip_prefix("Bearer ")?.trim();
        let claims = JwtService::verify_token(token).ok()?;
        let user_id = ObjectId::parse_str(&claims.sub).ok()?;

        Some(AuthGuard {
            user_id,
            email: claims.email,
        })
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.headers().get_one("Authorization").and_then(AuthGuard::from_header) {
            Some(auth) => Outcome::Success(auth),
            None => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthGuard {
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

    #[test]
    fn header_must_carry_a_bearer_token() {
        assert!(AuthGuard::from_header("Basic abc").is_none());
        assert!(AuthGuard::from_header("Bearer not-a-jwt").is_none());
    }

    #[test]
    fn valid_token_yields_identity() {
        let id = ObjectId::new();
        let token = JwtService::generate_access_token(&id, "ops@firm.example").unwrap();
        let auth = AuthGuard::from_header(&format!("Bearer {}", token)).unwrap();
        assert_eq!(auth.user_id, id);
        assert_eq!(auth.email, "ops@firm.example");
    }
}
