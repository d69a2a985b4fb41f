use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtService;

impl JwtService {
    pub fn generate_access_token(user_id: &ObjectId, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
        Self::generate_with_secret(user_id, email, &crate::config::Config::jwt_secret())
    }

    fn generate_with_secret(user_id: &ObjectId, email: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let expiry = crate::config::Config::jwt_expiry();
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: user_id.to_hex(),
            email: email.to_string(),
            exp: now + expiry,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    pub fn verify_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        Self::verify_with_secret(token, &crate::config::Config::jwt_secret())
    }

    fn verify_with_secret(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

pub struct PasswordService;

impl PasswordService {
    pub fn hash(password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
    }

    pub fn verify(password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let user_id = ObjectId::new();
        let token = JwtService::generate_with_secret(&user_id, "ops@firm.example", "s3cret").unwrap();
        let claims = JwtService::verify_with_secret(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, user_id.to_hex());
        assert_eq!(claims.email, "ops@firm.example");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = JwtService::generate_with_secret(&ObjectId::new(), "a@b.co", "one").unwrap();
        assert!(JwtService::verify_with_secret(&token, "two").is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = bcrypt::hash("hunter22", 4).unwrap();
        assert!(PasswordService::verify("hunter22", &hash));
        assert!(!PasswordService::verify("hunter23", &hash));
        assert!(!PasswordService::verify("hunter22", "not-a-hash"));
    }
}
