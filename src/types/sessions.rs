use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ChatMessage;

#[derive(Deserialize, ToSchema)]
pub struct SaveSessionRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SaveSessionResponse {
    pub id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct DeleteAllResponse {
    pub deleted: u64,
}
