use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use super::schema;
pub use super::schema::{lead_notes, leads, memberships, org_invitations, organizations, users};

/// Local mirror of an identity-provider user. The provider's stable id is
/// the primary key; nothing else about the row is authoritative here.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, Selectable)]
#[diesel(table_name = users)]
#[diesel(primary_key(external_id))]
pub struct User {
    pub external_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, Selectable)]
#[diesel(table_name = organizations)]
#[diesel(primary_key(external_id))]
pub struct Organization {
    pub external_id: String,
    pub name: String,
    pub slug: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Join row granting a user a role within an organization. One row per
/// (user, organization) pair, enforced by the composite primary key.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, Selectable)]
#[diesel(table_name = memberships)]
#[diesel(primary_key(user_id, organization_id))]
pub struct Membership {
    pub user_id: String,
    pub organization_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, Selectable)]
#[diesel(table_name = leads)]
pub struct Lead {
    pub id: Uuid,
    pub organization_id: String,
    pub name: String,
    pub contact_email: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, Selectable)]
#[diesel(table_name = lead_notes)]
pub struct LeadNote {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub created_by: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable, Insertable, Selectable)]
#[diesel(table_name = org_invitations)]
pub struct OrgInvitation {
    pub id: Uuid,
    pub organization_id: String,
    pub email: String,
    pub role: String,
    pub invited_by: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(external_id: String, email: String, first_name: String, last_name: String) -> Self {
        let now = Utc::now();
        Self {
            external_id,
            email,
            first_name,
            last_name,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Organization {
    pub fn new(
        external_id: String,
        name: String,
        slug: Option<String>,
        created_by: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            external_id,
            name,
            slug,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Membership {
    pub fn new(user_id: String, organization_id: String, role: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            organization_id,
            role: role.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
