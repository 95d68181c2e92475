//! [`DirectoryClient`] implementation that speaks LDAP.

use super::{DirectoryClient, DirectoryConnection, DirectoryError, Entry, ErrorKind, SearchScope, ServerAddress};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};

// LDAP result code for a refused bind (RFC 4511, appendix A).
const RC_INVALID_CREDENTIALS: u32 = 49;

/// [`DirectoryClient`] that connects to a real directory server using the `ldap3` crate.
///
/// Every call to [`connect`](DirectoryClient::connect) opens a fresh TCP (or TLS) connection and
/// spawns a task on the current tokio runtime to drive it. The task ends, and the socket is
/// closed, once the connection is closed or dropped.
#[derive(Clone, Debug, Default)]
pub struct LdapDirectory {
    _private: (),
}

impl LdapDirectory {
    /// Creates a new LDAP directory client.
    pub fn new() -> Self {
        LdapDirectory::default()
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    type Connection = LdapConnection;

    #[tracing_attributes::instrument]
    async fn connect(&self, server: &ServerAddress) -> Result<LdapConnection, DirectoryError> {
        let url = server.url();
        let (conn, ldap) = LdapConnAsync::with_settings(LdapConnSettings::new(), &url)
            .await
            .map_err(|e| DirectoryError::new(ErrorKind::ConnectionFailed, e))?;
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                tracing::warn!(url = %url, error = %err, "LDAP connection terminated with error");
            }
        });
        Ok(LdapConnection { ldap })
    }
}

/// A connection opened by [`LdapDirectory`].
#[derive(Debug)]
pub struct LdapConnection {
    ldap: Ldap,
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        let res = self
            .ldap
            .simple_bind(dn, password)
            .await
            .map_err(|e| DirectoryError::new(ErrorKind::ConnectionFailed, e))?;
        let kind = if res.rc == RC_INVALID_CREDENTIALS {
            ErrorKind::InvalidCredentials
        } else {
            ErrorKind::OperationFailed
        };
        res.success().map_err(|e| DirectoryError::new(kind, e))?;
        Ok(())
    }

    async fn search(&mut self, base: &str, scope: SearchScope, filter: &str, attrs: &[&str]) -> Result<Vec<Entry>, DirectoryError> {
        let scope = match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::Subtree => Scope::Subtree,
        };
        let (entries, _res) = self
            .ldap
            .search(base, scope, filter, attrs.to_vec())
            .await
            .map_err(|e| DirectoryError::new(ErrorKind::ConnectionFailed, e))?
            .success()
            .map_err(|e| DirectoryError::new(ErrorKind::OperationFailed, e))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| Entry {
                dn: entry.dn,
                attrs: entry.attrs,
            })
            .collect())
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        self.ldap.unbind().await.map_err(|e| DirectoryError::new(ErrorKind::ConnectionFailed, e))
    }
}
