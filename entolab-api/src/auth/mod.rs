//! Authentication: registration, login, sessions, recovery codes
//!
//! Passwords are stored as salted SHA-256 digests; session tokens are
//! random 256-bit values of which only the digest is persisted. Account
//! recovery uses one-time codes handed out at registration.

mod extract;
mod handlers;
mod rate_limit;
pub mod service;

pub use extract::CurrentUser;
pub use handlers::auth_routes;
pub use rate_limit::LoginLimiter;
