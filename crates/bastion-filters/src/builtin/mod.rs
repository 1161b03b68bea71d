//! Stock filters.
//!
//! - [`CorsFilter`] - cross-origin policy (authorization + result)
//! - [`RoleAuthorizationFilter`] - role-based access control (authorization)
//! - [`ErrorEnvelopeFilter`] - fault to JSON error envelope (exception)

pub mod authorization;
pub mod cors;
pub mod error_envelope;

pub use authorization::{AccessDecision, AccessEvaluator, RoleAuthorizationFilter, RoleBuilder};
pub use cors::{AllowedOrigins, CorsBuilder, CorsConfig, CorsFilter};
pub use error_envelope::ErrorEnvelopeFilter;
