pub mod analyses;
pub mod handlers;
pub mod middleware;
pub mod notifications;
pub mod routes;
pub mod scheduler;

pub use routes::create_router;
