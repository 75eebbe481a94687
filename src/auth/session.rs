//! Caller identity extraction.
//!
//! Sessions are HS256 bearer tokens minted by the identity provider's
//! front-channel; the `sub` claim carries the provider's stable user id.
//! The extractor never consults ambient state: handlers receive a `Caller`
//! value and thread it into the authorization resolver explicitly.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// The request's caller. `user_id` is `None` for anonymous requests; the
/// resolver turns that into `Unauthenticated` so the decision lives in one
/// place.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Caller::anonymous());
        };

        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| unauthorized("Malformed authorization header"))?;

        let key = DecodingKey::from_secret(state.config.session.jwt_secret.as_bytes());
        let data = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
            .map_err(|e| unauthorized(&format!("Invalid session token: {}", e)))?;

        Ok(Caller::authenticated(data.claims.sub))
    }
}

fn unauthorized(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
}
