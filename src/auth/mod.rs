//! # Auth Module
//!
//! Bearer tokens for protected resources and password hashing for stored
//! credentials.

pub mod crypto;
pub mod errors;
pub mod jwt;

pub use crypto::{hash_password, verify_password, PasswordPolicy};
pub use errors::{AuthError, AuthResult};
pub use jwt::{JwtClaims, JwtConfig, JwtManager, TokenResponse};
