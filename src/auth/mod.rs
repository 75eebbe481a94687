pub mod roles;
pub mod session;

pub use roles::{resolve_org_role, AccessError, OrgRole, RoleGrant};
pub use session::Caller;
