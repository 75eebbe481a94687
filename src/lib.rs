use diesel_migrations::{embed_migrations, EmbeddedMigrations};

pub mod api_router;
pub mod auth;
pub mod leads;
pub mod orgs;
pub mod shared;
pub mod webhooks;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
