//! Typed domain events.
//!
//! The identity provider delivers a `{type, data}` envelope whose payload
//! shape varies by type. Everything is decoded and validated here, at the
//! verification boundary; the processor only ever sees well-formed payloads.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// A verified, typed notification of a state change in the identity
/// provider. One case per handled event type; deliveries with an
/// unrecognized tag decode to `Unhandled` so the route can acknowledge
/// them without failing the whole delivery.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    UserCreated(UserCreated),
    UserUpdated(UserUpdated),
    UserDeleted(UserDeleted),
    OrganizationCreated(OrganizationCreated),
    OrganizationUpdated(OrganizationUpdated),
    OrganizationDeleted(OrganizationDeleted),
    InvitationAccepted(InvitationAccepted),
    MembershipDeleted(MembershipDeleted),
    Unhandled(String),
}

impl DomainEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::UserCreated(_) => "user.created",
            Self::UserUpdated(_) => "user.updated",
            Self::UserDeleted(_) => "user.deleted",
            Self::OrganizationCreated(_) => "organization.created",
            Self::OrganizationUpdated(_) => "organization.updated",
            Self::OrganizationDeleted(_) => "organization.deleted",
            Self::InvitationAccepted(_) => "organizationInvitation.accepted",
            Self::MembershipDeleted(_) => "organizationMembership.deleted",
            Self::Unhandled(kind) => kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserCreated {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone)]
pub struct UserUpdated {
    pub id: String,
    /// `None` when the payload names no primary address; the existing
    /// email is left untouched in that case.
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone)]
pub struct UserDeleted {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct OrganizationCreated {
    pub id: String,
    pub name: String,
    pub slug: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Clone)]
pub struct OrganizationUpdated {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct OrganizationDeleted {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct InvitationAccepted {
    pub email_address: String,
    pub organization_id: String,
    pub role_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MembershipDeleted {
    pub user_id: String,
    pub organization_id: String,
}

// Wire shapes as the provider sends them. Fields are optional here and
// promoted to required (or defaulted) during validation.

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct RawEmailAddress {
    id: Option<String>,
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: Option<String>,
    email_addresses: Option<Vec<RawEmailAddress>>,
    first_name: Option<String>,
    last_name: Option<String>,
    primary_email_address_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUserDeleted {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOrganization {
    id: Option<String>,
    name: Option<String>,
    slug: Option<String>,
    created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInvitation {
    email_address: Option<String>,
    organization_id: Option<String>,
    role_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMembershipDeleted {
    organization: Option<RawOrganizationRef>,
    public_user_data: Option<RawPublicUserData>,
}

#[derive(Debug, Deserialize)]
struct RawOrganizationRef {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPublicUserData {
    user_id: Option<String>,
}

fn parse<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|e| EventError::MalformedPayload(e.to_string()))
}

impl RawUser {
    /// The address whose id matches `primary_email_address_id`, if any.
    fn primary_email(&self) -> Option<String> {
        let primary_id = self.primary_email_address_id.as_deref()?;
        self.email_addresses
            .as_ref()?
            .iter()
            .find(|e| e.id.as_deref() == Some(primary_id))
            .and_then(|e| e.email_address.clone())
    }
}

/// Decode a raw delivery body into a typed event, enforcing each event
/// type's required-field schema.
pub fn decode_event(body: &str) -> Result<DomainEvent, EventError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| EventError::MalformedPayload(e.to_string()))?;

    match envelope.kind.as_str() {
        "user.created" => {
            let raw: RawUser = parse(envelope.data)?;
            let id = raw.id.clone().ok_or(EventError::MissingField("id"))?;
            if raw.email_addresses.is_none() {
                return Err(EventError::MissingField("email_addresses"));
            }
            Ok(DomainEvent::UserCreated(UserCreated {
                email: raw.primary_email().unwrap_or_default(),
                first_name: raw.first_name.unwrap_or_default(),
                last_name: raw.last_name.unwrap_or_default(),
                id,
            }))
        }
        "user.updated" => {
            let raw: RawUser = parse(envelope.data)?;
            let id = raw.id.clone().ok_or(EventError::MissingField("id"))?;
            if raw.email_addresses.is_none() {
                return Err(EventError::MissingField("email_addresses"));
            }
            Ok(DomainEvent::UserUpdated(UserUpdated {
                email: raw.primary_email(),
                first_name: raw.first_name.unwrap_or_default(),
                last_name: raw.last_name.unwrap_or_default(),
                id,
            }))
        }
        "user.deleted" => {
            let raw: RawUserDeleted = parse(envelope.data)?;
            Ok(DomainEvent::UserDeleted(UserDeleted {
                id: raw.id.ok_or(EventError::MissingField("id"))?,
            }))
        }
        "organization.created" => {
            let raw: RawOrganization = parse(envelope.data)?;
            Ok(DomainEvent::OrganizationCreated(OrganizationCreated {
                id: raw.id.ok_or(EventError::MissingField("id"))?,
                name: raw.name.ok_or(EventError::MissingField("name"))?,
                slug: raw.slug,
                created_by: raw.created_by.ok_or(EventError::MissingField("created_by"))?,
            }))
        }
        "organization.updated" => {
            let raw: RawOrganization = parse(envelope.data)?;
            Ok(DomainEvent::OrganizationUpdated(OrganizationUpdated {
                id: raw.id.ok_or(EventError::MissingField("id"))?,
                name: raw.name.ok_or(EventError::MissingField("name"))?,
            }))
        }
        "organization.deleted" => {
            let raw: RawOrganization = parse(envelope.data)?;
            Ok(DomainEvent::OrganizationDeleted(OrganizationDeleted {
                id: raw.id.ok_or(EventError::MissingField("id"))?,
            }))
        }
        "organizationInvitation.accepted" => {
            let raw: RawInvitation = parse(envelope.data)?;
            Ok(DomainEvent::InvitationAccepted(InvitationAccepted {
                email_address: raw
                    .email_address
                    .ok_or(EventError::MissingField("email_address"))?,
                organization_id: raw
                    .organization_id
                    .ok_or(EventError::MissingField("organization_id"))?,
                role_name: raw.role_name,
            }))
        }
        "organizationMembership.deleted" => {
            let raw: RawMembershipDeleted = parse(envelope.data)?;
            Ok(DomainEvent::MembershipDeleted(MembershipDeleted {
                user_id: raw
                    .public_user_data
                    .and_then(|u| u.user_id)
                    .ok_or(EventError::MissingField("public_user_data.user_id"))?,
                organization_id: raw
                    .organization
                    .and_then(|o| o.id)
                    .ok_or(EventError::MissingField("organization.id"))?,
            }))
        }
        other => Ok(DomainEvent::Unhandled(other.to_string())),
    }
}
