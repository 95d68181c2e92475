//! The service provider interface (SPI) for auth

use super::Password;
use async_trait::async_trait;
use std::fmt::{self, Debug, Display, Formatter};
use thiserror::Error;

/// Defines the requirements for Authentication implementations
#[async_trait]
pub trait Authenticator: Sync + Send + Debug {
    /// Authenticate the given user with the given credentials.
    ///
    /// Implementations must not tell the caller why a login was refused: every refusal is the
    /// same [`AuthenticationError`]. Reasons belong in the implementation's own logging.
    async fn authenticate(&self, username: &str, creds: &Credentials) -> Result<Principal, AuthenticationError>;

    /// Implement to set the name of the authenticator. By default it returns the type signature.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The error returned when an [`Authenticator`] refuses a login.
///
/// Deliberately carries no detail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("authentication denied")]
pub struct AuthenticationError;

/// Credentials passed to an [`Authenticator`]
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    /// The password that the client sent.
    pub password: Option<Password>,
}

impl Credentials {
    /// The password as a string slice, if one was supplied.
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(Password::as_str)
    }
}

impl From<&str> for Credentials {
    fn from(s: &str) -> Self {
        Credentials {
            password: Some(Password::from(s)),
        }
    }
}

impl From<String> for Credentials {
    fn from(s: String) -> Self {
        Credentials {
            password: Some(Password::from(s)),
        }
    }
}

/// The identity of an authenticated user, as handed back to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    /// The canonical username
    pub username: String,
}

impl Display for Principal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}
