mod auth;
mod error_handler;
mod presence;

pub use auth::auth_middleware;
pub use error_handler::log_errors;
pub use presence::record_presence;
