//! Organization endpoints: role lookup and member invitations.
//!
//! Every handler resolves the caller's role fresh and gates on the
//! capability predicates; the decision is never cached across requests.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{resolve_org_role, AccessError, Caller, OrgRole};
use crate::shared::models::OrgInvitation;
use crate::shared::schema::org_invitations;
use crate::shared::state::AppState;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/organizations/{org_id}/role", get(get_org_role))
        .route(
            "/organizations/{org_id}/invites",
            post(create_invite).get(list_invites),
        )
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role: OrgRole,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub message: String,
    pub invited_email: String,
    pub role: String,
}

pub async fn get_org_role(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    caller: Caller,
) -> Result<Json<RoleResponse>, AccessError> {
    let conn = state.conn.clone();
    let grant = tokio::task::spawn_blocking(move || {
        let mut db = conn.get()?;
        resolve_org_role(&mut db, &caller, &org_id)
    })
    .await
    .map_err(|e| AccessError::Internal(e.to_string()))??;

    Ok(Json(RoleResponse { role: grant.role }))
}

pub async fn create_invite(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    caller: Caller,
    Json(req): Json<InviteRequest>,
) -> Result<(StatusCode, Json<InviteResponse>), AccessError> {
    let conn = state.conn.clone();
    let response = tokio::task::spawn_blocking(move || {
        let mut db = conn.get()?;
        let grant = resolve_org_role(&mut db, &caller, &org_id)?;

        if !grant.role.can_manage_members() {
            return Err(AccessError::Forbidden(
                "Only admins and owners can invite members".to_string(),
            ));
        }

        let invite_role = match req.role.as_str() {
            "MEMBER" => OrgRole::Member,
            "ADMIN" => OrgRole::Admin,
            _ => {
                return Err(AccessError::Validation(
                    "Invalid role. Must be MEMBER or ADMIN".to_string(),
                ))
            }
        };

        // Granting ADMIN is held to a stricter bar than general member
        // management: only an ADMIN caller may do it.
        if invite_role == OrgRole::Admin && grant.role != OrgRole::Admin {
            return Err(AccessError::Forbidden(
                "Only admins can invite other admins".to_string(),
            ));
        }

        let invitation = OrgInvitation {
            id: Uuid::new_v4(),
            organization_id: org_id,
            email: req.email,
            role: invite_role.as_str().to_string(),
            invited_by: grant.user_id,
            status: "PENDING".to_string(),
            created_at: Utc::now(),
        };
        diesel::insert_into(org_invitations::table)
            .values(&invitation)
            .execute(&mut db)?;

        Ok(InviteResponse {
            message: "Invitation sent successfully".to_string(),
            invited_email: invitation.email,
            role: invitation.role,
        })
    })
    .await
    .map_err(|e| AccessError::Internal(e.to_string()))??;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_invites(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    caller: Caller,
) -> Result<Json<Vec<OrgInvitation>>, AccessError> {
    let conn = state.conn.clone();
    let invitations = tokio::task::spawn_blocking(move || {
        let mut db = conn.get()?;
        let grant = resolve_org_role(&mut db, &caller, &org_id)?;

        if !grant.role.can_manage_members() {
            return Err(AccessError::Forbidden(
                "Only admins and owners can view invitations".to_string(),
            ));
        }

        let rows = org_invitations::table
            .filter(org_invitations::organization_id.eq(&org_id))
            .filter(org_invitations::status.eq("PENDING"))
            .order(org_invitations::created_at.desc())
            .load::<OrgInvitation>(&mut db)?;
        Ok(rows)
    })
    .await
    .map_err(|e| AccessError::Internal(e.to_string()))??;

    Ok(Json(invitations))
}
