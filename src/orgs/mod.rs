pub mod routes;

pub use routes::configure;
