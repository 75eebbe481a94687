//! The event processor: one deterministic, transactional mutation of the
//! mirror per verified domain event.
//!
//! Delivery order is not trusted. Every precondition (creator exists,
//! target exists) is re-checked inside the event's own transaction, and
//! same-entity writers are serialized by row locks and the tables' unique
//! constraints rather than any in-process queue. Create-only paths are
//! intentionally not idempotent: a duplicate delivery trips a uniqueness
//! constraint and is reported as `DuplicateEvent` so the caller can
//! acknowledge it instead of provoking redelivery.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use log::info;

use super::events::{
    DomainEvent, InvitationAccepted, MembershipDeleted, OrganizationCreated, OrganizationDeleted,
    OrganizationUpdated, UserCreated, UserDeleted, UserUpdated,
};
use crate::auth::roles::OrgRole;
use crate::shared::models::{Membership, Organization, User};
use crate::shared::schema::{lead_notes, leads, memberships, org_invitations, organizations, users};
use crate::shared::utils::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("User not found")]
    UserNotFound,
    #[error("Organization not found")]
    OrganizationNotFound,
    #[error("User not found in DB")]
    CreatorNotFound,
    #[error("duplicate delivery: {0}")]
    DuplicateEvent(String),
    #[error("Unhandled event type: {0}")]
    UnhandledEventType(String),
    #[error("database error: {0}")]
    Database(diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl From<diesel::result::Error> for ProcessorError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                Self::DuplicateEvent(info.message().to_string())
            }
            other => Self::Database(other),
        }
    }
}

/// What a successfully processed event did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    UserCreated,
    UserUpdated,
    UserDeleted,
    OrganizationCreated,
    OrganizationUpdated,
    OrganizationDeleted,
    InvitationAccepted,
    MembershipDeleted,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserChanges<'a> {
    email: Option<&'a str>,
    first_name: &'a str,
    last_name: &'a str,
    updated_at: DateTime<Utc>,
}

pub struct EventProcessor {
    pool: DbPool,
}

impl EventProcessor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Dispatch a verified event to its handler. Synchronous diesel work;
    /// call through `spawn_blocking` from async contexts.
    pub fn process(&self, event: DomainEvent) -> Result<Applied, ProcessorError> {
        info!("processing {} event", event.kind());
        match event {
            DomainEvent::UserCreated(data) => self.user_created(data),
            DomainEvent::UserUpdated(data) => self.user_updated(data),
            DomainEvent::UserDeleted(data) => self.user_deleted(data),
            DomainEvent::OrganizationCreated(data) => self.organization_created(data),
            DomainEvent::OrganizationUpdated(data) => self.organization_updated(data),
            DomainEvent::OrganizationDeleted(data) => self.organization_deleted(data),
            DomainEvent::InvitationAccepted(data) => self.invitation_accepted(data),
            DomainEvent::MembershipDeleted(data) => self.membership_deleted(data),
            DomainEvent::Unhandled(kind) => Err(ProcessorError::UnhandledEventType(kind)),
        }
    }

    fn user_created(&self, data: UserCreated) -> Result<Applied, ProcessorError> {
        let mut conn = self.pool.get()?;
        let user = User::new(data.id, data.email, data.first_name, data.last_name);
        diesel::insert_into(users::table)
            .values(&user)
            .execute(&mut conn)?;
        Ok(Applied::UserCreated)
    }

    fn user_updated(&self, data: UserUpdated) -> Result<Applied, ProcessorError> {
        let mut conn = self.pool.get()?;
        let changes = UserChanges {
            email: data.email.as_deref(),
            first_name: &data.first_name,
            last_name: &data.last_name,
            updated_at: Utc::now(),
        };
        let affected = diesel::update(users::table.find(&data.id))
            .set(&changes)
            .execute(&mut conn)?;
        if affected == 0 {
            return Err(ProcessorError::UserNotFound);
        }
        Ok(Applied::UserUpdated)
    }

    /// Cascading user removal: memberships, authored notes, then every
    /// organization the user created (with its memberships, leads and
    /// their notes, and pending invitations), then the user row. One
    /// transaction; a failure at any step leaves the mirror untouched.
    fn user_deleted(&self, data: UserDeleted) -> Result<Applied, ProcessorError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, ProcessorError, _>(|conn| {
            let target: Option<User> = users::table
                .find(&data.id)
                .for_update()
                .first(conn)
                .optional()?;
            if target.is_none() {
                // Already gone; a re-delivered or out-of-order delete is
                // acknowledged rather than failed.
                info!("user {} absent on delete, treating as applied", data.id);
                return Ok(Applied::UserDeleted);
            }

            diesel::delete(memberships::table.filter(memberships::user_id.eq(&data.id)))
                .execute(conn)?;
            diesel::delete(lead_notes::table.filter(lead_notes::created_by.eq(&data.id)))
                .execute(conn)?;

            let created_orgs: Vec<String> = organizations::table
                .filter(organizations::created_by.eq(&data.id))
                .select(organizations::external_id)
                .load(conn)?;

            for org_id in &created_orgs {
                delete_organization_contents(conn, org_id)?;
                diesel::delete(organizations::table.find(org_id)).execute(conn)?;
            }

            diesel::delete(users::table.find(&data.id)).execute(conn)?;
            Ok(Applied::UserDeleted)
        })
    }

    fn organization_created(&self, data: OrganizationCreated) -> Result<Applied, ProcessorError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, ProcessorError, _>(|conn| {
            let creator: Option<String> = users::table
                .find(&data.created_by)
                .select(users::external_id)
                .first(conn)
                .optional()?;
            if creator.is_none() {
                return Err(ProcessorError::CreatorNotFound);
            }

            let org = Organization::new(
                data.id.clone(),
                data.name,
                data.slug,
                data.created_by.clone(),
            );
            diesel::insert_into(organizations::table)
                .values(&org)
                .execute(conn)?;

            let membership = Membership::new(data.created_by, data.id, OrgRole::Admin.as_str());
            diesel::insert_into(memberships::table)
                .values(&membership)
                .execute(conn)?;

            Ok(Applied::OrganizationCreated)
        })
    }

    fn organization_updated(&self, data: OrganizationUpdated) -> Result<Applied, ProcessorError> {
        let mut conn = self.pool.get()?;
        let affected = diesel::update(organizations::table.find(&data.id))
            .set((
                organizations::name.eq(&data.name),
                organizations::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        if affected == 0 {
            return Err(ProcessorError::OrganizationNotFound);
        }
        Ok(Applied::OrganizationUpdated)
    }

    fn organization_deleted(&self, data: OrganizationDeleted) -> Result<Applied, ProcessorError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, ProcessorError, _>(|conn| {
            let target: Option<String> = organizations::table
                .find(&data.id)
                .for_update()
                .select(organizations::external_id)
                .first(conn)
                .optional()?;
            if target.is_none() {
                info!(
                    "organization {} absent on delete, treating as applied",
                    data.id
                );
                return Ok(Applied::OrganizationDeleted);
            }

            delete_organization_contents(conn, &data.id)?;
            diesel::delete(organizations::table.find(&data.id)).execute(conn)?;
            Ok(Applied::OrganizationDeleted)
        })
    }

    fn invitation_accepted(&self, data: InvitationAccepted) -> Result<Applied, ProcessorError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, ProcessorError, _>(|conn| {
            let org_id: Option<String> = organizations::table
                .find(&data.organization_id)
                .select(organizations::external_id)
                .first(conn)
                .optional()?;
            let Some(org_id) = org_id else {
                return Err(ProcessorError::OrganizationNotFound);
            };

            let user_id: Option<String> = users::table
                .filter(users::email.eq(&data.email_address))
                .select(users::external_id)
                .first(conn)
                .optional()?;
            let Some(user_id) = user_id else {
                return Err(ProcessorError::UserNotFound);
            };

            let role = OrgRole::from_label(data.role_name.as_deref().unwrap_or(""));
            let membership = Membership::new(user_id, org_id.clone(), role.as_str());
            diesel::insert_into(memberships::table)
                .values(&membership)
                .on_conflict((memberships::user_id, memberships::organization_id))
                .do_update()
                .set((
                    memberships::role.eq(role.as_str()),
                    memberships::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;

            // Close out the locally recorded invitation, if one exists.
            diesel::update(
                org_invitations::table
                    .filter(org_invitations::organization_id.eq(&org_id))
                    .filter(org_invitations::email.eq(&data.email_address))
                    .filter(org_invitations::status.eq("PENDING")),
            )
            .set(org_invitations::status.eq("ACCEPTED"))
            .execute(conn)?;

            Ok(Applied::InvitationAccepted)
        })
    }

    fn membership_deleted(&self, data: MembershipDeleted) -> Result<Applied, ProcessorError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, ProcessorError, _>(|conn| {
            let org: Option<String> = organizations::table
                .find(&data.organization_id)
                .select(organizations::external_id)
                .first(conn)
                .optional()?;
            if org.is_none() {
                return Err(ProcessorError::OrganizationNotFound);
            }

            let user: Option<String> = users::table
                .find(&data.user_id)
                .select(users::external_id)
                .first(conn)
                .optional()?;
            if user.is_none() {
                return Err(ProcessorError::UserNotFound);
            }

            diesel::delete(memberships::table.find((&data.user_id, &data.organization_id)))
                .execute(conn)?;
            Ok(Applied::MembershipDeleted)
        })
    }
}

/// Remove everything an organization owns: memberships, notes on its
/// leads, the leads themselves, and recorded invitations. The caller
/// deletes the organization row afterwards, inside the same transaction.
fn delete_organization_contents(
    conn: &mut PgConnection,
    org_id: &str,
) -> Result<(), ProcessorError> {
    diesel::delete(memberships::table.filter(memberships::organization_id.eq(org_id)))
        .execute(conn)?;

    let org_leads = leads::table
        .filter(leads::organization_id.eq(org_id))
        .select(leads::id);
    diesel::delete(lead_notes::table.filter(lead_notes::lead_id.eq_any(org_leads)))
        .execute(conn)?;
    diesel::delete(leads::table.filter(leads::organization_id.eq(org_id))).execute(conn)?;

    diesel::delete(org_invitations::table.filter(org_invitations::organization_id.eq(org_id)))
        .execute(conn)?;

    Ok(())
}
