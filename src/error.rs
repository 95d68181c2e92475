//! Contains the error types used by the LDAP authenticator

use crate::directory::DirectoryError;
use thiserror::Error;

/// Error returned when building an [`LdapAuthenticator`](crate::LdapAuthenticator) from an
/// incomplete or contradictory configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field required by the selected DN resolution mode was not set.
    #[error("missing required configuration field `{0}`")]
    MissingField(&'static str),
    /// A template field lacks the `{username}` placeholder.
    #[error("configuration field `{0}` must contain the {{username}} placeholder")]
    MissingPlaceholder(&'static str),
    /// A field was set that contradicts the selected DN resolution mode.
    #[error("configuration field `{0}` cannot be combined with lookup_dn")]
    ConflictingMode(&'static str),
    /// A field has a value that can never work.
    #[error("invalid value for configuration field `{field}`: {reason}")]
    InvalidValue {
        /// The offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
    /// The username pattern is not a valid regular expression.
    #[error("invalid username pattern: {0}")]
    InvalidUsernamePattern(#[from] regex::Error),
    /// The configuration file could not be read.
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid JSON or has fields of the wrong type.
    #[error("could not parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why an authentication attempt was refused. Only ever logged, never handed to the caller.
#[derive(Error, Debug)]
pub(crate) enum Rejection {
    #[error("username does not match the allowed pattern")]
    InvalidUsername,
    #[error("empty password")]
    EmptyPassword,
    #[error("directory unavailable during {stage}: {source}")]
    DirectoryUnavailable {
        stage: &'static str,
        #[source]
        source: DirectoryError,
    },
    #[error("no directory entry matches the user")]
    EntryNotFound,
    #[error("{0} directory entries match the user")]
    AmbiguousEntry(usize),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user is not a member of any allowed group")]
    NotInAllowedGroups,
}

impl Rejection {
    pub(crate) fn unavailable(stage: &'static str) -> impl FnOnce(DirectoryError) -> Rejection {
        move |source| Rejection::DirectoryUnavailable { stage, source }
    }

    /// Rejections that point at the directory or its configuration rather than at the user.
    pub(crate) fn needs_operator(&self) -> bool {
        matches!(
            self,
            Rejection::DirectoryUnavailable { .. } | Rejection::EntryNotFound | Rejection::AmbiguousEntry(_)
        )
    }
}
