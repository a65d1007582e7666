//! Authentication for mxgate
//!
//! JWT bearer tokens carrying the user's extension, Argon2 password
//! hashing for the admin surface, and the actix-web request extractor used
//! by every protected data-plane endpoint.

pub mod claims;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::BearerUser;
pub use password::PasswordService;
