use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

/// A client whose earlier job completed; keyed by lowercased email.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub client_name: String,
    pub starting_point: String,
    pub created_at: DateTime,
    pub last_job_at: DateTime,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub email: String,
    pub client_name: String,
    pub starting_point: String,
}

impl From<Client> for ClientResponse {
    fn from(client: Client) -> Self {
        ClientResponse {
            email: client.email,
            client_name: client.client_name,
            starting_point: client.starting_point,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ClientLookupResponse {
    pub exists: bool,
    pub client: Option<ClientResponse>,
}
