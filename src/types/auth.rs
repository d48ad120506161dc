use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::UserProfile;

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub profile: UserProfile,
}

#[derive(Deserialize)]
pub struct AuthCallbackQuery {
    pub code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateDisplayNameRequest {
    pub name: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TermsStatus {
    pub version: String,
    pub accepted: bool,
}
