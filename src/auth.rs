use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;

const TOKEN_LIFETIME_SECS: usize = 3600 * 24 * 7; // 1 week

/// Who is making a request, as asserted by a token we signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub is_anonymous: bool,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    /// A fresh single-use identity with no recoverable credentials.
    pub fn new_anonymous() -> Self {
        Identity {
            uid: format!("anon_{}", Uuid::new_v4().simple()),
            is_anonymous: true,
            display_name: None,
            email: None,
        }
    }

    pub fn persistent(uid: &str, display_name: Option<String>, email: Option<String>) -> Self {
        Identity {
            uid: uid.to_string(),
            is_anonymous: false,
            display_name,
            email,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub anon: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    // Signed-out anonymous subjects, kept until any token they held has expired.
    retired: Cache<String, ()>,
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            retired: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(Duration::from_secs(TOKEN_LIFETIME_SECS as u64))
                .build(),
        }
    }

    /// Rejects every outstanding token for a signed-out anonymous identity.
    /// Persistent accounts are never retired; their tokens run to expiry.
    pub async fn retire(&self, identity: &Identity) {
        if identity.is_anonymous {
            self.retired.insert(identity.uid.clone(), ()).await;
        }
    }

    pub fn sign(&self, identity: &Identity) -> Result<String, AppError> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: identity.uid.clone(),
            exp: now + TOKEN_LIFETIME_SECS,
            iat: now,
            anon: identity.is_anonymous,
            name: identity.display_name.clone(),
            email: identity.email.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| {
                warn!("Invalid token: {:?}", e);
                AppError::Auth("invalid or expired token".to_string())
            })?
            .claims;

        if claims.anon && self.retired.contains_key(&claims.sub) {
            return Err(AppError::Auth("this identity has signed out".to_string()));
        }

        Ok(Identity {
            uid: claims.sub,
            is_anonymous: claims.anon,
            display_name: claims.name,
            email: claims.email,
        })
    }
}
