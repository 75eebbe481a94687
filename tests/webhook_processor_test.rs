//! Processor integration tests against a real Postgres mirror.
//!
//! Tests skip with a message when DATABASE_URL is not set or not
//! reachable, so the suite stays green on machines without a database.

use diesel::prelude::*;
use diesel_migrations::MigrationHarness;
use uuid::Uuid;

use crmserver::shared::models::{Lead, LeadNote, Membership, Organization, User};
use crmserver::shared::schema::{lead_notes, leads, memberships, organizations, users};
use crmserver::shared::utils::{create_conn, DbPool};
use crmserver::webhooks::events::{
    DomainEvent, InvitationAccepted, MembershipDeleted, OrganizationCreated, OrganizationDeleted,
    UserCreated, UserDeleted, UserUpdated,
};
use crmserver::webhooks::processor::{Applied, EventProcessor, ProcessorError};
use crmserver::MIGRATIONS;

fn test_pool() -> Option<DbPool> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("Skipping test - DATABASE_URL not set");
            return None;
        }
    };
    let pool = match create_conn(&url, 5) {
        Ok(pool) => pool,
        Err(_) => {
            println!("Skipping test - cannot build pool");
            return None;
        }
    };
    let mut conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => {
            println!("Skipping test - cannot connect to Postgres");
            return None;
        }
    };
    if conn.run_pending_migrations(MIGRATIONS).is_err() {
        println!("Skipping test - cannot run migrations");
        return None;
    }
    Some(pool)
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

fn user_created_event(id: &str, email: &str) -> DomainEvent {
    DomainEvent::UserCreated(UserCreated {
        id: id.to_string(),
        email: email.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
    })
}

fn seed_user(processor: &EventProcessor, id: &str, email: &str) {
    assert_eq!(
        processor.process(user_created_event(id, email)).unwrap(),
        Applied::UserCreated
    );
}

#[test]
fn user_created_is_looked_up_by_external_id() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool.clone());

    let id = unique("user");
    let email = format!("{}@example.com", id);
    seed_user(&processor, &id, &email);

    let mut conn = pool.get().unwrap();
    let row: User = users::table.find(&id).first(&mut conn).unwrap();
    assert_eq!(row.email, email);
    assert_eq!(row.first_name, "Ada");
    assert_eq!(row.last_name, "Lovelace");
}

#[test]
fn duplicate_user_created_reports_duplicate_event() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool);

    let id = unique("user");
    let email = format!("{}@example.com", id);
    seed_user(&processor, &id, &email);

    match processor.process(user_created_event(&id, &email)) {
        Err(ProcessorError::DuplicateEvent(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn user_updated_twice_is_idempotent() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool.clone());

    let id = unique("user");
    seed_user(&processor, &id, &format!("{}@example.com", id));

    let new_email = format!("{}@new.example.com", id);
    let update = DomainEvent::UserUpdated(UserUpdated {
        id: id.clone(),
        email: Some(new_email.clone()),
        first_name: "Augusta".to_string(),
        last_name: "King".to_string(),
    });

    assert_eq!(processor.process(update.clone()).unwrap(), Applied::UserUpdated);
    let mut conn = pool.get().unwrap();
    let after_first: User = users::table.find(&id).first(&mut conn).unwrap();

    assert_eq!(processor.process(update).unwrap(), Applied::UserUpdated);
    let after_second: User = users::table.find(&id).first(&mut conn).unwrap();

    assert_eq!(after_first.email, new_email);
    assert_eq!(after_first.first_name, "Augusta");
    assert_eq!(after_second.email, after_first.email);
    assert_eq!(after_second.first_name, after_first.first_name);
    assert_eq!(after_second.last_name, after_first.last_name);
}

#[test]
fn user_updated_for_unknown_user_is_not_found() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool);

    let update = DomainEvent::UserUpdated(UserUpdated {
        id: unique("user"),
        email: None,
        first_name: "Nobody".to_string(),
        last_name: "Here".to_string(),
    });
    match processor.process(update) {
        Err(ProcessorError::UserNotFound) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn organization_created_creates_admin_membership_for_creator() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool.clone());

    let user_id = unique("user");
    seed_user(&processor, &user_id, &format!("{}@example.com", user_id));

    let org_id = unique("org");
    let event = DomainEvent::OrganizationCreated(OrganizationCreated {
        id: org_id.clone(),
        name: "Acme".to_string(),
        slug: Some("acme".to_string()),
        created_by: user_id.clone(),
    });
    assert_eq!(processor.process(event).unwrap(), Applied::OrganizationCreated);

    let mut conn = pool.get().unwrap();
    let org: Organization = organizations::table.find(&org_id).first(&mut conn).unwrap();
    assert_eq!(org.name, "Acme");
    assert_eq!(org.created_by, user_id);

    let membership: Membership = memberships::table
        .find((&user_id, &org_id))
        .first(&mut conn)
        .unwrap();
    assert_eq!(membership.role, "ADMIN");
}

#[test]
fn organization_created_without_creator_fails_and_writes_nothing() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool.clone());

    let org_id = unique("org");
    let event = DomainEvent::OrganizationCreated(OrganizationCreated {
        id: org_id.clone(),
        name: "Acme".to_string(),
        slug: None,
        created_by: unique("user"),
    });
    match processor.process(event) {
        Err(ProcessorError::CreatorNotFound) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    let mut conn = pool.get().unwrap();
    let org: Option<Organization> = organizations::table
        .find(&org_id)
        .first(&mut conn)
        .optional()
        .unwrap();
    assert!(org.is_none());

    let membership_count: i64 = memberships::table
        .filter(memberships::organization_id.eq(&org_id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(membership_count, 0);
}

#[test]
fn invitation_accepted_maps_role_labels_totally() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool.clone());

    let creator = unique("user");
    seed_user(&processor, &creator, &format!("{}@example.com", creator));
    let org_id = unique("org");
    processor
        .process(DomainEvent::OrganizationCreated(OrganizationCreated {
            id: org_id.clone(),
            name: "Acme".to_string(),
            slug: None,
            created_by: creator,
        }))
        .unwrap();

    let invitee = unique("user");
    let invitee_email = format!("{}@example.com", invitee);
    seed_user(&processor, &invitee, &invitee_email);

    // Recognized admin label.
    processor
        .process(DomainEvent::InvitationAccepted(InvitationAccepted {
            email_address: invitee_email.clone(),
            organization_id: org_id.clone(),
            role_name: Some("org:admin".to_string()),
        }))
        .unwrap();

    let mut conn = pool.get().unwrap();
    let membership: Membership = memberships::table
        .find((&invitee, &org_id))
        .first(&mut conn)
        .unwrap();
    assert_eq!(membership.role, "ADMIN");

    // Unrecognized label downgrades to MEMBER via the upsert path.
    processor
        .process(DomainEvent::InvitationAccepted(InvitationAccepted {
            email_address: invitee_email,
            organization_id: org_id.clone(),
            role_name: Some("org:mystery".to_string()),
        }))
        .unwrap();

    let membership: Membership = memberships::table
        .find((&invitee, &org_id))
        .first(&mut conn)
        .unwrap();
    assert_eq!(membership.role, "MEMBER");

    let count: i64 = memberships::table
        .filter(memberships::user_id.eq(&invitee))
        .filter(memberships::organization_id.eq(&org_id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(count, 1, "upsert must not duplicate the membership");
}

#[test]
fn invitation_accepted_for_unknown_user_fails() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool);

    let creator = unique("user");
    seed_user(&processor, &creator, &format!("{}@example.com", creator));
    let org_id = unique("org");
    processor
        .process(DomainEvent::OrganizationCreated(OrganizationCreated {
            id: org_id.clone(),
            name: "Acme".to_string(),
            slug: None,
            created_by: creator,
        }))
        .unwrap();

    match processor.process(DomainEvent::InvitationAccepted(InvitationAccepted {
        email_address: "nobody@example.com".to_string(),
        organization_id: org_id,
        role_name: None,
    })) {
        Err(ProcessorError::UserNotFound) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn membership_deleted_removes_the_row() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool.clone());

    let creator = unique("user");
    seed_user(&processor, &creator, &format!("{}@example.com", creator));
    let org_id = unique("org");
    processor
        .process(DomainEvent::OrganizationCreated(OrganizationCreated {
            id: org_id.clone(),
            name: "Acme".to_string(),
            slug: None,
            created_by: creator.clone(),
        }))
        .unwrap();

    processor
        .process(DomainEvent::MembershipDeleted(MembershipDeleted {
            user_id: creator.clone(),
            organization_id: org_id.clone(),
        }))
        .unwrap();

    let mut conn = pool.get().unwrap();
    let membership: Option<Membership> = memberships::table
        .find((&creator, &org_id))
        .first(&mut conn)
        .optional()
        .unwrap();
    assert!(membership.is_none());
}

#[test]
fn user_deleted_cascades_through_created_organizations() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool.clone());

    let owner = unique("user");
    seed_user(&processor, &owner, &format!("{}@example.com", owner));
    let org_id = unique("org");
    processor
        .process(DomainEvent::OrganizationCreated(OrganizationCreated {
            id: org_id.clone(),
            name: "Acme".to_string(),
            slug: None,
            created_by: owner.clone(),
        }))
        .unwrap();

    // Another member joins and writes a note on one of the org's leads.
    let member = unique("user");
    let member_email = format!("{}@example.com", member);
    seed_user(&processor, &member, &member_email);
    processor
        .process(DomainEvent::InvitationAccepted(InvitationAccepted {
            email_address: member_email,
            organization_id: org_id.clone(),
            role_name: None,
        }))
        .unwrap();

    let mut conn = pool.get().unwrap();
    let lead = Lead {
        id: Uuid::new_v4(),
        organization_id: org_id.clone(),
        name: "Prospect".to_string(),
        contact_email: None,
        status: "NEW".to_string(),
        created_at: chrono::Utc::now(),
    };
    diesel::insert_into(leads::table)
        .values(&lead)
        .execute(&mut conn)
        .unwrap();
    let note = LeadNote {
        id: Uuid::new_v4(),
        lead_id: lead.id,
        created_by: member.clone(),
        content: "warm intro".to_string(),
        created_at: chrono::Utc::now(),
    };
    diesel::insert_into(lead_notes::table)
        .values(&note)
        .execute(&mut conn)
        .unwrap();

    processor
        .process(DomainEvent::UserDeleted(UserDeleted { id: owner.clone() }))
        .unwrap();

    let user: Option<User> = users::table
        .find(&owner)
        .first(&mut conn)
        .optional()
        .unwrap();
    assert!(user.is_none());

    let org: Option<Organization> = organizations::table
        .find(&org_id)
        .first(&mut conn)
        .optional()
        .unwrap();
    assert!(org.is_none(), "created organization must be removed");

    let membership_count: i64 = memberships::table
        .filter(memberships::organization_id.eq(&org_id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(membership_count, 0, "all memberships in the org must go");

    let lead_count: i64 = leads::table
        .filter(leads::organization_id.eq(&org_id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(lead_count, 0, "the org's leads must go");

    let note_count: i64 = lead_notes::table
        .filter(lead_notes::lead_id.eq(lead.id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(note_count, 0, "notes on the org's leads must go");

    // The other member survives; only their membership went away.
    let member_row: Option<User> = users::table
        .find(&member)
        .first(&mut conn)
        .optional()
        .unwrap();
    assert!(member_row.is_some());
}

#[test]
fn deleting_an_absent_user_is_acknowledged() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool);

    let result = processor.process(DomainEvent::UserDeleted(UserDeleted {
        id: unique("user"),
    }));
    assert_eq!(result.unwrap(), Applied::UserDeleted);
}

#[test]
fn organization_deleted_cascades_and_tolerates_redelivery() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool.clone());

    let owner = unique("user");
    seed_user(&processor, &owner, &format!("{}@example.com", owner));
    let org_id = unique("org");
    processor
        .process(DomainEvent::OrganizationCreated(OrganizationCreated {
            id: org_id.clone(),
            name: "Acme".to_string(),
            slug: None,
            created_by: owner,
        }))
        .unwrap();

    let delete = DomainEvent::OrganizationDeleted(OrganizationDeleted { id: org_id.clone() });
    assert_eq!(
        processor.process(delete.clone()).unwrap(),
        Applied::OrganizationDeleted
    );
    // Redelivery of the same delete is a no-op, not a failure.
    assert_eq!(processor.process(delete).unwrap(), Applied::OrganizationDeleted);

    let mut conn = pool.get().unwrap();
    let org: Option<Organization> = organizations::table
        .find(&org_id)
        .first(&mut conn)
        .optional()
        .unwrap();
    assert!(org.is_none());
}

#[test]
fn unhandled_event_type_is_reported() {
    let Some(pool) = test_pool() else { return };
    let processor = EventProcessor::new(pool);

    match processor.process(DomainEvent::Unhandled("session.created".to_string())) {
        Err(ProcessorError::UnhandledEventType(kind)) => assert_eq!(kind, "session.created"),
        other => panic!("unexpected result: {:?}", other),
    }
}
