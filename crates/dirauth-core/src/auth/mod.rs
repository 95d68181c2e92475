//! Contains the [`Authenticator`] trait and the types that flow through it.
//!
//! A host (an FTP server, a notebook hub, an HTTP login endpoint...) only ever talks to an
//! `Authenticator`: it hands over a username plus [`Credentials`] and gets back either a
//! [`Principal`] or an [`AuthenticationError`]. Back-ends such as the LDAP one in the `dirauth`
//! crate implement the trait. To define your own, for example one that lets everybody in:
//!
//! 1. Declare dependencies on async-trait and dirauth-core
//!
//! ```toml
//! async-trait = "0.1.89"
//! dirauth-core = { path = "../path/to/dirauth-core" }
//! ```
//!
//! 2. Implement the [`Authenticator`] trait:
//!
//! ```no_run
//! use dirauth_core::auth::{Authenticator, AuthenticationError, Credentials, Principal};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct OpenDoorAuthenticator;
//!
//! #[async_trait]
//! impl Authenticator for OpenDoorAuthenticator {
//!     async fn authenticate(&self, username: &str, _creds: &Credentials) -> Result<Principal, AuthenticationError> {
//!         Ok(Principal { username: username.to_string() })
//!     }
//! }
//! ```
//!

mod authenticator;
pub use authenticator::{AuthenticationError, Authenticator, Credentials, Principal};

mod password;
pub use password::Password;
