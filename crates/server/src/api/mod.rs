pub mod auth;
pub mod download;
pub mod files;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
