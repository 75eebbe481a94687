//! Organization roles and the capability checks derived from them.
//!
//! Every protected endpoint resolves the caller's membership fresh from the
//! database and derives its capabilities from the role; nothing is cached
//! across requests.

use axum::{http::StatusCode, response::IntoResponse, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::auth::session::Caller;
use crate::shared::schema::memberships;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgRole {
    Owner,
    Admin,
    Member,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
            Self::Member => "MEMBER",
        }
    }

    /// Total mapping from an external role label to a role. The identity
    /// provider spells roles several ways ("admin", "org:admin", ...);
    /// anything unrecognized becomes MEMBER.
    pub fn from_label(input: &str) -> Self {
        match input.to_lowercase().as_str() {
            "owner" | "org:owner" => Self::Owner,
            "admin" | "org:admin" => Self::Admin,
            _ => Self::Member,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::Owner)
    }

    pub fn can_manage_org(&self) -> bool {
        matches!(self, Self::Admin)
    }

    pub fn can_write_notes(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin | Self::Member)
    }

    pub fn can_manage_members(&self) -> bool {
        matches!(self, Self::Admin | Self::Owner)
    }
}

/// A resolved membership: who the caller is and what role they hold in the
/// organization the request targets.
#[derive(Debug, Clone)]
pub struct RoleGrant {
    pub user_id: String,
    pub role: OrgRole,
}

/// Failure modes of protected endpoints. The first three are the
/// authorization taxonomy proper; the rest let route handlers use `?`
/// end to end the way the rest of the crate does.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("Not a member of this organization")]
    NotAMember,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Internal server error")]
    Database(#[from] diesel::result::Error),
    #[error("Internal server error")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AccessError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotAMember | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(detail) => {
                log::error!("database failure in protected endpoint: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Pool(detail) => {
                log::error!("connection pool failure in protected endpoint: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Internal(detail) => {
                log::error!("internal failure in protected endpoint: {}", detail);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Resolve the caller's role within an organization. Fails with
/// `Unauthenticated` when the request carried no identity and `NotAMember`
/// when no membership row exists. Pure read.
pub fn resolve_org_role(
    conn: &mut PgConnection,
    caller: &Caller,
    org_id: &str,
) -> Result<RoleGrant, AccessError> {
    let user_id = caller
        .user_id
        .as_deref()
        .ok_or(AccessError::Unauthenticated)?;

    let role: Option<String> = memberships::table
        .find((user_id, org_id))
        .select(memberships::role)
        .first(conn)
        .optional()?;

    match role {
        Some(label) => Ok(RoleGrant {
            user_id: user_id.to_string(),
            role: OrgRole::from_label(&label),
        }),
        None => Err(AccessError::NotAMember),
    }
}
