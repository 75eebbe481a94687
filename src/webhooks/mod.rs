pub mod events;
pub mod processor;
pub mod routes;
pub mod verify;

pub use routes::configure;
