mod auth;
mod chat;
mod feed;
mod sessions;

pub use auth::*;
pub use chat::*;
pub use feed::*;
pub use sessions::*;

use serde::Serialize;
use utoipa::ToSchema;

/// Body of every error response.
#[derive(Serialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
