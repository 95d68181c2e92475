//! The directory client abstraction that the authenticator talks through.
//!
//! A [`DirectoryClient`] opens [`DirectoryConnection`]s to a server. A connection supports
//! exactly what the authentication flow needs: bind, search and close. Two implementations are
//! provided: [`LdapDirectory`], which speaks LDAP using the `ldap3` crate, and
//! [`MemoryDirectory`], an in-process directory used for tests and demos.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};

mod error;
pub use error::{DirectoryError, ErrorKind};

mod ldap;
pub use ldap::{LdapConnection, LdapDirectory};

pub mod memory;
pub use memory::MemoryDirectory;

/// Where to find the directory server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Connect using LDAP over TLS (`ldaps://`)
    pub use_tls: bool,
}

impl ServerAddress {
    /// The URL form of this address, e.g. `ldaps://ldap.example.org:636`.
    pub fn url(&self) -> String {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl Display for ServerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// The scope of a directory search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the entry named by the base DN
    Base,
    /// The base entry and all its descendants
    Subtree,
}

/// An entry returned by a directory search.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Entry {
    /// The entry's distinguished name
    pub dn: String,
    /// Attribute values, keyed by attribute name
    pub attrs: HashMap<String, Vec<String>>,
}

impl Entry {
    /// All values of the named attribute. Attribute names are matched case-insensitively since
    /// directories do not agree on the case they return them in.
    pub fn values(&self, attr: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .map(|(_, values)| values.as_slice())
            .unwrap_or_default()
    }
}

/// Opens connections to a directory server.
#[async_trait]
pub trait DirectoryClient: Send + Sync + Debug {
    /// The connection type handed out by this client.
    type Connection: DirectoryConnection;

    /// Opens a new, unbound connection to the given server.
    async fn connect(&self, server: &ServerAddress) -> Result<Self::Connection, DirectoryError>;
}

/// A single open connection to a directory server.
///
/// Callers must call [`close`](DirectoryConnection::close) when done. Dropping a connection
/// without closing it must still release the underlying resources, which is what happens when
/// an authentication attempt gets cancelled.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Authenticates the connection as `dn` using a simple bind. A refusal by the server must be
    /// reported as [`ErrorKind::InvalidCredentials`].
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// Searches below (or at) `base` and returns the matching entries with the requested
    /// attributes.
    async fn search(&mut self, base: &str, scope: SearchScope, filter: &str, attrs: &[&str]) -> Result<Vec<Entry>, DirectoryError>;

    /// Closes the connection.
    async fn close(&mut self) -> Result<(), DirectoryError>;
}
