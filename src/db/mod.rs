use log::{error, info, warn};
use mongodb::bson::{doc, DateTime};
use mongodb::options::IndexOptions;
use mongodb::{Client, Cursor, Database, IndexModel};
use rocket::fairing::AdHoc;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::models::{Permissions, Role, User, ADMIN_ROLE_NAME};
use crate::utils::ApiError;

pub const JOBS: &str = "jobs";
pub const USERS: &str = "users";
pub const ROLES: &str = "roles";
pub const CLIENTS: &str = "clients";
pub const COMPANY_DETAILS: &str = "company_details";
pub const PERSON_DETAILS: &str = "person_details";
pub const NOTIFICATIONS: &str = "notifications";
pub const SERVICES: &str = "services";
pub const MONTHLY_PAYMENTS: &str = "monthly_payments";

pub fn init() -> AdHoc {
    AdHoc::on_ignite("MongoDB", |rocket| async {
        match connect().await {
            Ok(database) => {
                info!("✓ MongoDB connected successfully");
                if let Err(e) = prepare(&database).await {
                    error!("✗ Failed to prepare database: {}", e);
                }
                rocket.manage(database)
            }
            Err(e) => {
                error!("✗ Failed to connect to MongoDB: {}", e);
                rocket
            }
        }
    })
}

async fn connect() -> Result<Database, mongodb::error::Error> {
    let uri = Config::mongodb_uri();
    let client = Client::with_uri_str(&uri).await?;

    // Test connection
    client
        .database("admin")
        .run_command(doc! {"ping": 1}, None)
        .await?;

    Ok(client.database(&Config::database_name()))
}

/// Unique indexes plus the built-in Admin role and optional bootstrap user.
async fn prepare(db: &Database) -> Result<(), mongodb::error::Error> {
    let unique = || IndexOptions::builder().unique(true).build();

    db.collection::<User>(USERS)
        .create_index(IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<Role>(ROLES)
        .create_index(IndexModel::builder().keys(doc! { "name": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>(CLIENTS)
        .create_index(IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>(COMPANY_DETAILS)
        .create_index(IndexModel::builder().keys(doc! { "jobId": 1 }).options(unique()).build(), None)
        .await?;
    db.collection::<mongodb::bson::Document>(JOBS)
        .create_index(IndexModel::builder().keys(doc! { "status": 1, "createdAt": -1 }).build(), None)
        .await?;

    let roles = db.collection::<Role>(ROLES);
    let admin_role = match roles.find_one(doc! { "name": ADMIN_ROLE_NAME }, None).await? {
        Some(role) => role.id,
        None => {
            let now = DateTime::now();
            let role = Role {
                id: None,
                name: ADMIN_ROLE_NAME.to_string(),
                description: Some("Full access".to_string()),
                permissions: Permissions::all(),
                created_at: now,
                updated_at: now,
            };
            let inserted = roles.insert_one(&role, None).await?;
            info!("✓ Created {} role", ADMIN_ROLE_NAME);
            inserted.inserted_id.as_object_id()
        }
    };

    if let (Some(email), Some(password)) = (Config::admin_email(), Config::admin_password()) {
        let users = db.collection::<User>(USERS);
        let email = crate::utils::normalize_email(&email);
        if users.find_one(doc! { "email": &email }, None).await?.is_none() {
            match crate::services::PasswordService::hash(&password) {
                Ok(password_hash) => {
                    let now = DateTime::now();
                    let user = User {
                        id: None,
                        name: "Administrator".to_string(),
                        email: email.clone(),
                        role: admin_role,
                        password_hash,
                        is_active: true,
                        created_at: now,
                        updated_at: now,
                    };
                    users.insert_one(&user, None).await?;
                    info!("✓ Bootstrap admin {} created", email);
                }
                Err(e) => warn!("Bootstrap admin not created: {}", e),
            }
        }
    }

    Ok(())
}

/// Drains a cursor into a `Vec`.
pub async fn collect<T: DeserializeOwned>(mut cursor: Cursor<T>) -> Result<Vec<T>, ApiError> {
    let mut items = Vec::new();
    while cursor
        .advance()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?
    {
        let item = cursor
            .deserialize_current()
            .map_err(|e| ApiError::internal_error(format!("Deserialization error: {}", e)))?;
        items.push(item);
    }
    Ok(items)
}

pub type DbConn = Database;
