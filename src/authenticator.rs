//! [`Authenticator`] implementation that authenticates against an LDAP directory.

use crate::config::{DnResolution, LdapConfig, UserSearch};
use crate::directory::{DirectoryClient, DirectoryConnection, ErrorKind, LdapDirectory, SearchScope};
use crate::dn;
use crate::error::Rejection;
use async_trait::async_trait;
use dirauth_core::auth::{AuthenticationError, Authenticator, Credentials, Principal};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// [`Authenticator`] implementation that authenticates against an LDAP directory and authorizes
/// by group membership.
///
/// An attempt goes through these steps, each of which can refuse the login:
///
/// 1. The username must match the configured pattern and the password must not be blank. No
///    directory traffic happens for attempts that fail here.
/// 2. The user's DN is resolved. With a DN template this is string substitution. With DN lookup
///    a connection is bound as the service identity and a subtree search must find exactly one
///    entry, whose membership attribute gives the user's groups.
/// 3. A separate connection binds as the user's DN with the supplied password.
/// 4. If an allow-list is configured, one of the user's groups must be on it. In template mode
///    the groups are read from the user's own entry over the connection bound in step 3.
///
/// Every refusal looks the same to the caller. The reason is logged.
///
/// Each attempt uses its own connections and closes them before returning, so the authenticator
/// can be shared between tasks freely.
#[derive(Debug)]
pub struct LdapAuthenticator<C = LdapDirectory>
where
    C: DirectoryClient,
{
    config: Arc<LdapConfig>,
    client: C,
}

/// The directory entry of a user that proved their password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirectoryEntry {
    pub dn: String,
    pub groups: BTreeSet<String>,
}

impl<C: DirectoryClient> LdapAuthenticator<C> {
    /// Creates an authenticator from a validated configuration and a directory client. See
    /// [`Builder`](crate::Builder) for the usual way to get one.
    pub fn new(config: LdapConfig, client: C) -> Self {
        LdapAuthenticator {
            config: Arc::new(config),
            client,
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// The directory client in use.
    pub fn client(&self) -> &C {
        &self.client
    }

    pub(crate) async fn verify(&self, username: &str, creds: &Credentials) -> Result<DirectoryEntry, Rejection> {
        if !self.config.is_valid_username(username) {
            return Err(Rejection::InvalidUsername);
        }
        let password = match &creds.password {
            Some(password) if !password.is_blank() => password.as_str(),
            _ => return Err(Rejection::EmptyPassword),
        };

        let entry = match self.config.resolution() {
            DnResolution::Search(search) => {
                let entry = self.lookup(search, username).await?;
                debug!(dn = %entry.dn, groups = ?entry.groups, "found directory entry");
                self.check_password(&entry.dn, password, false).await?;
                entry
            }
            DnResolution::Template(template) => {
                let dn = template.render(username);
                let fetch_groups = self.config.allowed_groups().is_some();
                let groups = self.check_password(&dn, password, fetch_groups).await?;
                debug!(dn = %dn, groups = ?groups, "bound with templated DN");
                DirectoryEntry { dn, groups }
            }
        };

        self.authorize(&entry)?;
        Ok(entry)
    }

    // Finds the user's entry using the service identity.
    async fn lookup(&self, search: &UserSearch, username: &str) -> Result<DirectoryEntry, Rejection> {
        let mut conn = self
            .client
            .connect(self.config.server())
            .await
            .map_err(Rejection::unavailable("lookup connect"))?;
        let result = self.lookup_with(&mut conn, search, username).await;
        close(conn, "lookup").await;
        result
    }

    async fn lookup_with(&self, conn: &mut C::Connection, search: &UserSearch, username: &str) -> Result<DirectoryEntry, Rejection> {
        conn.bind(&search.bind_dn, search.bind_password.as_str())
            .await
            .map_err(Rejection::unavailable("service bind"))?;

        let filter = search.filter.render(username);
        let attribute = self.config.membership_attribute();
        let mut entries = conn
            .search(&search.base, SearchScope::Subtree, &filter, &[attribute])
            .await
            .map_err(Rejection::unavailable("user search"))?;

        match entries.len() {
            0 => Err(Rejection::EntryNotFound),
            1 => {
                let entry = entries.remove(0);
                let groups = dn::group_names(entry.values(attribute));
                Ok(DirectoryEntry { dn: entry.dn, groups })
            }
            n => Err(Rejection::AmbiguousEntry(n)),
        }
    }

    // Binds as the user on a fresh connection. Returns the user's groups when asked to fetch
    // them, an empty set otherwise.
    async fn check_password(&self, dn: &str, password: &str, fetch_groups: bool) -> Result<BTreeSet<String>, Rejection> {
        let mut conn = self
            .client
            .connect(self.config.server())
            .await
            .map_err(Rejection::unavailable("user connect"))?;
        let result = self.check_password_with(&mut conn, dn, password, fetch_groups).await;
        close(conn, "user").await;
        result
    }

    async fn check_password_with(&self, conn: &mut C::Connection, dn: &str, password: &str, fetch_groups: bool) -> Result<BTreeSet<String>, Rejection> {
        conn.bind(dn, password).await.map_err(|e| match e.kind() {
            ErrorKind::ConnectionFailed => Rejection::DirectoryUnavailable { stage: "user bind", source: e },
            ErrorKind::InvalidCredentials | ErrorKind::OperationFailed => Rejection::InvalidCredentials,
        })?;
        if !fetch_groups {
            return Ok(BTreeSet::new());
        }

        let attribute = self.config.membership_attribute();
        let entries = conn
            .search(dn, SearchScope::Base, "(objectClass=*)", &[attribute])
            .await
            .map_err(Rejection::unavailable("group read"))?;
        Ok(entries.iter().flat_map(|entry| dn::group_names(entry.values(attribute))).collect())
    }

    fn authorize(&self, entry: &DirectoryEntry) -> Result<(), Rejection> {
        match self.config.allowed_groups() {
            Some(allowed) if entry.groups.is_disjoint(allowed) => Err(Rejection::NotInAllowedGroups),
            _ => Ok(()),
        }
    }
}

async fn close<Conn: DirectoryConnection>(mut conn: Conn, stage: &'static str) {
    if let Err(err) = conn.close().await {
        debug!(stage, error = %err, "error closing directory connection");
    }
}

#[async_trait]
impl<C: DirectoryClient> Authenticator for LdapAuthenticator<C> {
    #[tracing_attributes::instrument(skip(self, creds))]
    async fn authenticate(&self, username: &str, creds: &Credentials) -> Result<Principal, AuthenticationError> {
        match self.verify(username, creds).await {
            Ok(entry) => {
                info!(dn = %entry.dn, groups = ?entry.groups, "user authenticated");
                Ok(Principal {
                    username: username.to_string(),
                })
            }
            Err(rejection) if rejection.needs_operator() => {
                error!(reason = %rejection, "login refused");
                Err(AuthenticationError)
            }
            Err(rejection) => {
                warn!(reason = %rejection, "login refused");
                Err(AuthenticationError)
            }
        }
    }

    fn name(&self) -> &str {
        "ldap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;
    use crate::directory::MemoryDirectory;
    use pretty_assertions::assert_eq;

    const SERVICE_DN: &str = "cn=reader,dc=example,dc=org";
    const ALICE_DN: &str = "uid=alice,ou=people,dc=example,dc=org";

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new().with_account(SERVICE_DN, "svcpass").with_user(
            "alice",
            ALICE_DN,
            "correct",
            &["cn=admins,ou=groups,dc=example,dc=org", "cn=users,ou=groups,dc=example,dc=org"],
        )
    }

    fn search_mode() -> Builder {
        Builder::new()
            .with_server_address("ldap.example.org")
            .with_bind_credentials(SERVICE_DN, "svcpass")
            .with_lookup_dn(true)
            .with_user_search_base("dc=example,dc=org")
            .with_user_attribute("uid")
    }

    fn template_mode() -> Builder {
        Builder::new()
            .with_server_address("ldap.example.org")
            .with_bind_dn_template("uid={username},ou=people,dc=example,dc=org")
    }

    #[tokio::test]
    async fn resolves_dn_and_groups() {
        let auth = search_mode().build_with_client(directory()).unwrap();
        let entry = auth.verify("alice", &"correct".into()).await.unwrap();
        assert_eq!(ALICE_DN, entry.dn);
        assert_eq!(vec!["admins", "users"], entry.groups.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn input_rejections() {
        let dir = directory();
        let auth = search_mode().build_with_client(dir.clone()).unwrap();
        assert!(matches!(auth.verify("Alice", &"correct".into()).await, Err(Rejection::InvalidUsername)));
        assert!(matches!(auth.verify("alice", &"  ".into()).await, Err(Rejection::EmptyPassword)));
        assert!(matches!(auth.verify("alice", &Credentials::default()).await, Err(Rejection::EmptyPassword)));
        assert!(!dir.stats().any_io());
    }

    #[tokio::test]
    async fn ambiguous_entry_is_reported_distinctly() {
        let dir = directory().with_user("alice", "uid=alice,ou=contractors,dc=example,dc=org", "correct", &[]);
        let auth = search_mode().build_with_client(dir.clone()).unwrap();
        let rejection = auth.verify("alice", &"correct".into()).await.unwrap_err();
        assert!(matches!(rejection, Rejection::AmbiguousEntry(2)));
        assert!(rejection.needs_operator());
        let stats = dir.stats();
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.closed, 1);
    }

    #[tokio::test]
    async fn missing_entry() {
        let dir = directory();
        let auth = search_mode().build_with_client(dir.clone()).unwrap();
        assert!(matches!(auth.verify("carol", &"correct".into()).await, Err(Rejection::EntryNotFound)));
        assert_eq!(dir.stats().opened, dir.stats().closed);
    }

    #[tokio::test]
    async fn service_bind_failure_is_directory_problem() {
        let dir = directory();
        let auth = search_mode()
            .with_bind_credentials(SERVICE_DN, "expired")
            .build_with_client(dir.clone())
            .unwrap();
        let rejection = auth.verify("alice", &"correct".into()).await.unwrap_err();
        assert!(matches!(rejection, Rejection::DirectoryUnavailable { stage: "service bind", .. }));
        let stats = dir.stats();
        assert_eq!(stats.searches, 0);
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.opened, stats.closed);
    }

    #[tokio::test]
    async fn failed_user_search_is_directory_problem() {
        let dir = directory();
        let auth = search_mode()
            .with_user_search_filter("(uid={username}")
            .build_with_client(dir.clone())
            .unwrap();
        let rejection = auth.verify("alice", &"correct".into()).await.unwrap_err();
        assert!(matches!(rejection, Rejection::DirectoryUnavailable { stage: "user search", .. }));
        assert!(rejection.needs_operator());
        let stats = dir.stats();
        assert_eq!(stats.searches, 1);
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.opened, stats.closed);
    }

    #[tokio::test]
    async fn wrong_password_after_successful_lookup() {
        let dir = directory();
        let auth = search_mode().build_with_client(dir.clone()).unwrap();
        assert!(matches!(auth.verify("alice", &"wrong".into()).await, Err(Rejection::InvalidCredentials)));
        let stats = dir.stats();
        assert_eq!(stats.searches, 1);
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.closed, 2);
    }

    #[tokio::test]
    async fn unreachable_directory() {
        let auth = search_mode().build_with_client(directory().unreachable()).unwrap();
        let rejection = auth.verify("alice", &"correct".into()).await.unwrap_err();
        assert!(matches!(rejection, Rejection::DirectoryUnavailable { stage: "lookup connect", .. }));
    }

    #[tokio::test]
    async fn group_allow_list() {
        let auth = search_mode().with_allowed_groups(["ops"]).build_with_client(directory()).unwrap();
        assert!(matches!(auth.verify("alice", &"correct".into()).await, Err(Rejection::NotInAllowedGroups)));

        let auth = search_mode().with_allowed_groups(["ops", "users"]).build_with_client(directory()).unwrap();
        assert!(auth.verify("alice", &"correct".into()).await.is_ok());
    }

    #[tokio::test]
    async fn group_names_are_case_sensitive() {
        let auth = search_mode().with_allowed_groups(["Admins"]).build_with_client(directory()).unwrap();
        assert!(matches!(auth.verify("alice", &"correct".into()).await, Err(Rejection::NotInAllowedGroups)));
    }

    #[tokio::test]
    async fn template_mode_skips_lookup() {
        let dir = directory();
        let auth = template_mode().build_with_client(dir.clone()).unwrap();
        let entry = auth.verify("alice", &"correct".into()).await.unwrap();
        assert_eq!(ALICE_DN, entry.dn);
        assert!(entry.groups.is_empty());
        let stats = dir.stats();
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.searches, 0);
        assert_eq!(stats.closed, 1);
    }

    #[tokio::test]
    async fn template_mode_reads_groups_as_user_when_allow_list_set() {
        let dir = directory();
        let auth = template_mode().with_allowed_groups(["admins"]).build_with_client(dir.clone()).unwrap();
        let entry = auth.verify("alice", &"correct".into()).await.unwrap();
        assert!(entry.groups.contains("admins"));
        assert_eq!(dir.stats().searches, 1);
    }

    #[tokio::test]
    async fn template_mode_fails_closed_without_groups() {
        let dir = MemoryDirectory::new().with_user("bob", "uid=bob,ou=people,dc=example,dc=org", "hunter2", &[]);
        let auth = template_mode().with_allowed_groups(["admins"]).build_with_client(dir).unwrap();
        assert!(matches!(auth.verify("bob", &"hunter2".into()).await, Err(Rejection::NotInAllowedGroups)));
    }

    #[tokio::test]
    async fn template_mode_unreadable_groups_is_directory_problem() {
        let dir = directory().without_search_access();
        let auth = template_mode().with_allowed_groups(["admins"]).build_with_client(dir.clone()).unwrap();
        let rejection = auth.verify("alice", &"correct".into()).await.unwrap_err();
        assert!(matches!(rejection, Rejection::DirectoryUnavailable { stage: "group read", .. }));
        assert!(rejection.needs_operator());
        let stats = dir.stats();
        assert_eq!(stats.searches, 1);
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.opened, stats.closed);
    }

    #[tokio::test]
    async fn template_mode_wrong_password() {
        let auth = template_mode().build_with_client(directory()).unwrap();
        assert!(matches!(auth.verify("alice", &"nope".into()).await, Err(Rejection::InvalidCredentials)));
    }

    #[tokio::test]
    async fn custom_membership_attribute() {
        let mut attrs = std::collections::HashMap::new();
        attrs.insert("uid".to_string(), vec!["dave".to_string()]);
        attrs.insert("isMemberOf".to_string(), vec!["cn=ops,ou=groups,dc=example,dc=org".to_string()]);
        let dave = crate::directory::Entry {
            dn: "uid=dave,ou=people,dc=example,dc=org".to_string(),
            attrs,
        };
        let dir = directory().with_entry(dave, Some("pw"));
        let auth = search_mode()
            .with_membership_attribute("isMemberOf")
            .with_allowed_groups(["ops"])
            .build_with_client(dir)
            .unwrap();
        assert!(auth.verify("dave", &"pw".into()).await.is_ok());
    }

    #[test]
    fn name_is_ldap() {
        let auth = template_mode().build_with_client(directory()).unwrap();
        assert_eq!("ldap", auth.name());
    }
}
