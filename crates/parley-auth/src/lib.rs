//! # parley-auth
//!
//! Password and token authentication for the Parley chat server.
//!
//! - [`store`]: the [`CredentialStore`] trait and its in-memory backend
//! - [`password`]: bcrypt hashing and the [`PasswordVerifier`]
//! - [`token`]: HS256 session tokens via [`TokenCodec`]
//! - [`gate`]: pulling a token out of a request and checking it with [`AuthGate`]

#![deny(unsafe_code)]

pub mod errors;
pub mod gate;
pub mod password;
pub mod store;
pub mod token;

pub use errors::{AuthError, GateError, TokenError};
pub use gate::{AuthGate, presented_token};
pub use password::{DEFAULT_COST, PasswordVerifier, hash_password, verify_password};
pub use store::{CredentialStore, InMemoryCredentialStore, UserRecord};
pub use token::{Claims, DEFAULT_TOKEN_TTL_MINUTES, IssuedToken, TokenCodec};
