//! This crate provides a [`dirauth-core`](dirauth_core) `Authenticator` implementation that
//! authenticates users against an LDAP directory and authorizes them by group membership.
//!
//! ```no_run
//! use dirauth::Builder;
//! use dirauth_core::auth::Authenticator;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let authenticator = Builder::new()
//!     .with_server_address("ldap.example.org")
//!     .with_bind_credentials("cn=reader,dc=example,dc=org", "secret")
//!     .with_lookup_dn(true)
//!     .with_user_search_base("ou=people,dc=example,dc=org")
//!     .with_user_attribute("uid")
//!     .with_allowed_groups(["admins"])
//!     .build()?;
//!
//! match authenticator.authenticate("alice", &"correct horse".into()).await {
//!     Ok(principal) => println!("welcome {}", principal),
//!     Err(_) => println!("access denied"),
//! }
//! # Ok(())
//! # }
//! ```

mod authenticator;
pub use authenticator::LdapAuthenticator;

pub mod config;
pub use config::{Builder, LdapConfig};

pub mod directory;
pub mod dn;

mod error;
pub use error::ConfigError;

pub mod template;
