use log::info;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::DateTime;

use crate::db::{DbConn, MONTHLY_PAYMENTS};
use crate::guards::Session;
use crate::models::{AddMonthlyPaymentDto, Feature, MonthlyPayment};
use crate::utils::{is_blank, normalize_email, validate_email, validate_month, ApiError, ApiResponse};

#[openapi(tag = "Payments")]
#[post("/monthlypayment/add", data = "<dto>")]
pub async fn add_monthly_payment(
    db: &State<DbConn>,
    session: Session,
    dto: Json<AddMonthlyPaymentDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    session.require(Feature::MonthlyPayments)?;

    if is_blank(&dto.client_name) {
        return Err(ApiError::bad_request("Client name is required"));
    }
    if !dto.amount.is_finite() || dto.amount <= 0.0 {
        return Err(ApiError::bad_request("Amount must be greater than zero"));
    }
    if !validate_month(&dto.month) {
        return Err(ApiError::bad_request("Month must be in YYYY-MM format"));
    }
    let gmail = match dto.gmail.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        Some(g) if !validate_email(g) => return Err(ApiError::bad_request("Invalid email")),
        Some(g) => Some(normalize_email(g)),
        None => None,
    };

    let payment = MonthlyPayment {
        id: None,
        client_name: dto.client_name.trim().to_string(),
        gmail,
        amount: dto.amount,
        month: dto.month.clone(),
        note: dto.note.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        recorded_by: session.user_id,
        created_at: DateTime::now(),
    };

    let result = db
        .collection::<MonthlyPayment>(MONTHLY_PAYMENTS)
        .insert_one(&payment, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to record payment: {}", e)))?;

    info!(
        "Payment of {:.2} for {} ({}) recorded by {}",
        payment.amount, payment.client_name, payment.month, session.user.email
    );

    Ok(Json(ApiResponse::success_with_message(
        "Payment recorded",
        serde_json::json!({
            "id": result.inserted_id.as_object_id().map(|id| id.to_hex()),
            "month": payment.month,
            "amount": payment.amount,
        }),
    )))
}
