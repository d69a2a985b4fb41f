#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod utils;

use dotenvy::dotenv;
use log::{error, info};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::fs::FileServer;
use rocket::http::{Header, Status};
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

use crate::config::Config;
use crate::guards::SessionSnapshot;
use crate::utils::ErrorContext;

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, PATCH, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- ERROR LOG ----------------------------- */

/// Logs every failed response together with who made the request. The
/// response itself is left untouched.
pub struct ErrorLogger;

#[rocket::async_trait]
impl Fairing for ErrorLogger {
    fn info(&self) -> Info {
        Info {
            name: "Error logger",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let status = response.status();
        if status.code < 400 {
            return;
        }

        let message = request
            .local_cache(|| ErrorContext(None))
            .0
            .clone()
            .unwrap_or_else(|| status.reason().unwrap_or("unknown error").to_string());

        match request.local_cache(|| None::<SessionSnapshot>) {
            Some(session) => error!(
                "{} {} -> {}: {} [user: {}, role: {}, permissions: {}]",
                request.method(),
                request.uri(),
                status.code,
                message,
                session.name,
                session.role.as_deref().unwrap_or("none"),
                serde_json::to_string(&session.permissions).unwrap_or_default(),
            ),
            None => error!(
                "{} {} -> {}: {} [anonymous]",
                request.method(),
                request.uri(),
                status.code,
                message
            ),
        }
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> rocket::serde::json::Value {
    let message = match status.code {
        400 => "Malformed request",
        401 => "Authentication required",
        403 => "You do not have access to this resource",
        404 => "Resource not found (check /api/v1 prefix)",
        413 => "Request body too large",
        422 => "Request body could not be parsed",
        503 => "Database unavailable",
        _ => "Internal server error",
    };

    rocket::serde::json::json!({
        "success": false,
        "message": message
    })
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/v1/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- LAUNCH ----------------------------- */

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    if Config::is_development() {
        info!("📚 Swagger UI → http://localhost:8000/api/docs");
    }
    info!("🚀 Intake API running");

    let upload_dir = Config::upload_dir();
    if let Err(e) = std::fs::create_dir_all(&upload_dir) {
        error!("✗ Cannot create upload directory {}: {}", upload_dir, e);
    }

    rocket::build()
        .attach(db::init())
        .attach(CORS)
        .attach(ErrorLogger)
        .mount("/", routes![options_handler])
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Auth
                routes::auth::login,
                routes::auth::me,
                // Users
                routes::user::list_users,
                routes::user::create_user,
                routes::user::update_user,
                // Roles
                routes::role::list_roles,
                routes::role::get_role,
                routes::role::create_role,
                routes::role::update_role,
                routes::role::update_role_permissions,
                routes::role::delete_role,
                // Jobs
                routes::job::create_job,
                routes::job::list_jobs,
                routes::job::get_job,
                routes::job::update_job,
                routes::job::approve_job,
                routes::job::reject_job,
                routes::job::resubmit_job,
                routes::job::cancel_job,
                routes::job::get_job_timeline,
                // Operations
                routes::operations::create_pre_approved_job,
                routes::operations::get_company_details,
                routes::operations::update_company_details,
                routes::operations::renew_company_credential,
                routes::operations::get_person_details,
                routes::operations::update_person_details,
                routes::operations::renew_person_credential,
                routes::operations::get_kyc_documents,
                routes::operations::update_kyc_documents,
                routes::operations::upload_engagement_letter,
                routes::operations::complete_job,
                // Clients
                routes::client::lookup_client,
                // Services
                routes::service::get_all_services,
                // Notifications
                routes::notification::list_notifications,
                routes::notification::unread_count,
                routes::notification::mark_read,
                // Payments
                routes::payment::add_monthly_payment,
                // Uploads
                routes::file_upload::upload_document,
            ],
        )
        .mount("/uploads", FileServer::from(upload_dir))
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register("/", catchers![default_catcher])
}
