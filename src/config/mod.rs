use rocket::figment::{Figment, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;

pub struct Config;

impl Config {
    fn figment() -> Figment {
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(&profile)
            .merge(Env::prefixed("ROCKET_").split("__"))
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret".to_string())
    }

    /// Access token lifetime in seconds.
    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(28800)
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn database_name() -> String {
        Self::figment()
            .extract_inner("database_name")
            .unwrap_or_else(|_| "intake".to_string())
    }

    pub fn upload_dir() -> String {
        Self::figment()
            .extract_inner("upload_dir")
            .unwrap_or_else(|_| "uploads".to_string())
    }

    pub fn max_upload_bytes() -> usize {
        Self::figment()
            .extract_inner("max_upload_bytes")
            .unwrap_or(10 * 1024 * 1024)
    }

    pub fn admin_email() -> Option<String> {
        Self::figment()
            .extract_inner("admin_email")
            .ok()
    }

    pub fn admin_password() -> Option<String> {
        Self::figment()
            .extract_inner("admin_password")
            .ok()
    }

    pub fn is_development() -> bool {
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());
        profile == "development"
    }
}
