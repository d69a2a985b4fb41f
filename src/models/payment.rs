use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPayment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub client_name: String,
    pub gmail: Option<String>,
    pub amount: f64,
    /// `YYYY-MM`
    pub month: String,
    pub note: Option<String>,
    pub recorded_by: ObjectId,
    pub created_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMonthlyPaymentDto {
    pub client_name: String,
    pub gmail: Option<String>,
    pub amount: f64,
    pub month: String,
    pub note: Option<String>,
}
