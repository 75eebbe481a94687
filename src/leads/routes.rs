//! Lead and lead-note endpoints.
//!
//! Leads belong to exactly one organization; notes belong to exactly one
//! lead and one author. Both note routes are gated on the write-notes
//! capability, and the lead is always re-checked to belong to the path
//! organization so one tenant can never read another's notes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{resolve_org_role, AccessError, Caller};
use crate::shared::models::{Lead, LeadNote};
use crate::shared::schema::{lead_notes, leads, users};
use crate::shared::state::AppState;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/organizations/{org_id}/leads",
            get(list_leads).post(create_lead),
        )
        .route(
            "/organizations/{org_id}/leads/{lead_id}/notes",
            get(list_notes).post(create_note),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub contact_email: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct NoteAuthor {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub created_by: NoteAuthor,
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    caller: Caller,
) -> Result<Json<Vec<Lead>>, AccessError> {
    let conn = state.conn.clone();
    let rows = tokio::task::spawn_blocking(move || {
        let mut db = conn.get()?;
        resolve_org_role(&mut db, &caller, &org_id)?;

        let rows = leads::table
            .filter(leads::organization_id.eq(&org_id))
            .order(leads::created_at.desc())
            .load::<Lead>(&mut db)?;
        Ok::<_, AccessError>(rows)
    })
    .await
    .map_err(|e| AccessError::Internal(e.to_string()))??;

    Ok(Json(rows))
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    caller: Caller,
    Json(req): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<Lead>), AccessError> {
    let conn = state.conn.clone();
    let lead = tokio::task::spawn_blocking(move || {
        let mut db = conn.get()?;
        resolve_org_role(&mut db, &caller, &org_id)?;

        if req.name.trim().is_empty() {
            return Err(AccessError::Validation("Lead name is required".to_string()));
        }

        let lead = Lead {
            id: Uuid::new_v4(),
            organization_id: org_id,
            name: req.name,
            contact_email: req.contact_email,
            status: req.status.unwrap_or_else(|| "NEW".to_string()),
            created_at: Utc::now(),
        };
        diesel::insert_into(leads::table)
            .values(&lead)
            .execute(&mut db)?;
        Ok(lead)
    })
    .await
    .map_err(|e| AccessError::Internal(e.to_string()))??;

    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn create_note(
    State(state): State<Arc<AppState>>,
    Path((org_id, lead_id)): Path<(String, Uuid)>,
    caller: Caller,
    Json(req): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<LeadNote>), AccessError> {
    let conn = state.conn.clone();
    let note = tokio::task::spawn_blocking(move || {
        let mut db = conn.get()?;
        let grant = resolve_org_role(&mut db, &caller, &org_id)?;

        if !grant.role.can_write_notes() {
            return Err(AccessError::Forbidden(
                "Insufficient permissions to write notes".to_string(),
            ));
        }

        require_lead_in_org(&mut db, &org_id, lead_id)?;

        let note = LeadNote {
            id: Uuid::new_v4(),
            lead_id,
            created_by: grant.user_id,
            content: req.content,
            created_at: Utc::now(),
        };
        diesel::insert_into(lead_notes::table)
            .values(&note)
            .execute(&mut db)?;
        Ok(note)
    })
    .await
    .map_err(|e| AccessError::Internal(e.to_string()))??;

    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    Path((org_id, lead_id)): Path<(String, Uuid)>,
    caller: Caller,
) -> Result<Json<Vec<NoteResponse>>, AccessError> {
    let conn = state.conn.clone();
    let notes = tokio::task::spawn_blocking(move || {
        let mut db = conn.get()?;
        let grant = resolve_org_role(&mut db, &caller, &org_id)?;

        if !grant.role.can_write_notes() {
            return Err(AccessError::Forbidden(
                "Insufficient permissions to view notes".to_string(),
            ));
        }

        require_lead_in_org(&mut db, &org_id, lead_id)?;

        let rows: Vec<(LeadNote, (String, String, String))> = lead_notes::table
            .inner_join(users::table)
            .filter(lead_notes::lead_id.eq(lead_id))
            .order(lead_notes::created_at.desc())
            .select((
                LeadNote::as_select(),
                (users::first_name, users::last_name, users::email),
            ))
            .load(&mut db)?;

        let notes = rows
            .into_iter()
            .map(|(note, (first_name, last_name, email))| NoteResponse {
                id: note.id,
                content: note.content,
                created_at: note.created_at,
                created_by: NoteAuthor {
                    first_name,
                    last_name,
                    email,
                },
            })
            .collect();
        Ok(notes)
    })
    .await
    .map_err(|e| AccessError::Internal(e.to_string()))??;

    Ok(Json(notes))
}

fn require_lead_in_org(
    db: &mut PgConnection,
    org_id: &str,
    lead_id: Uuid,
) -> Result<(), AccessError> {
    let found: Option<Uuid> = leads::table
        .find(lead_id)
        .filter(leads::organization_id.eq(org_id))
        .select(leads::id)
        .first(db)
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(AccessError::NotFound("Lead not found".to_string())),
    }
}
