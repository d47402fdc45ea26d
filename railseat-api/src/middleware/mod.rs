pub mod auth;

pub use auth::{customer_auth_middleware, AuthenticatedUser, CustomerClaims};
