//! An in-process directory.
//!
//! [`MemoryDirectory`] holds a fixed set of entries and behaves like a (very) small LDAP server:
//! simple binds check a stored password, searches understand equality, presence and `&` filters.
//! Every connection it hands out is accounted for in [`ConnectionStats`], which makes it handy
//! for verifying that callers never leak connections.

use super::{DirectoryClient, DirectoryConnection, DirectoryError, Entry, ErrorKind, SearchScope, ServerAddress};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A directory that lives in memory. Cloning it is cheap and clones share their statistics.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory {
    entries: Arc<Vec<StoredEntry>>,
    stats: Arc<Counters>,
    unreachable: bool,
    search_denied: bool,
    latency: Option<Duration>,
}

#[derive(Clone, Debug)]
struct StoredEntry {
    entry: Entry,
    password: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    abandoned: AtomicUsize,
    binds: AtomicUsize,
    searches: AtomicUsize,
}

/// A snapshot of what happened on the connections of a [`MemoryDirectory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Connections opened
    pub opened: usize,
    /// Connections closed through [`DirectoryConnection::close`]
    pub closed: usize,
    /// Connections dropped without being closed first
    pub abandoned: usize,
    /// Bind attempts
    pub binds: usize,
    /// Searches
    pub searches: usize,
}

impl ConnectionStats {
    /// Connections that were either closed or dropped.
    pub fn released(&self) -> usize {
        self.closed + self.abandoned
    }

    /// true if any directory operation at all took place.
    pub fn any_io(&self) -> bool {
        self.opened + self.binds + self.searches > 0
    }
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        MemoryDirectory::default()
    }

    /// Adds an entry. Entries without a password cannot be bound to.
    pub fn with_entry(mut self, entry: Entry, password: Option<&str>) -> Self {
        Arc::make_mut(&mut self.entries).push(StoredEntry {
            entry,
            password: password.map(str::to_string),
        });
        self
    }

    /// Adds a person entry with the given DN and password, a `uid` attribute and a `memberOf`
    /// value for each of the given group DNs.
    pub fn with_user(self, uid: &str, dn: &str, password: &str, member_of: &[&str]) -> Self {
        let mut attrs = HashMap::new();
        attrs.insert("uid".to_string(), vec![uid.to_string()]);
        attrs.insert("objectClass".to_string(), vec!["inetOrgPerson".to_string()]);
        if !member_of.is_empty() {
            attrs.insert("memberOf".to_string(), member_of.iter().map(|g| g.to_string()).collect());
        }
        self.with_entry(Entry { dn: dn.to_string(), attrs }, Some(password))
    }

    /// Adds an account that is only meant for binding, like a service account.
    pub fn with_account(self, dn: &str, password: &str) -> Self {
        self.with_entry(
            Entry {
                dn: dn.to_string(),
                attrs: HashMap::new(),
            },
            Some(password),
        )
    }

    /// Makes every connection attempt fail, as if the server were down.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Refuses every search with an access error, like a server whose ACLs hide entries from
    /// the bound identity.
    pub fn without_search_access(mut self) -> Self {
        self.search_denied = true;
        self
    }

    /// Delays every bind and search by the given duration.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// What happened so far.
    pub fn stats(&self) -> ConnectionStats {
        let c = &self.stats;
        ConnectionStats {
            opened: c.opened.load(Ordering::SeqCst),
            closed: c.closed.load(Ordering::SeqCst),
            abandoned: c.abandoned.load(Ordering::SeqCst),
            binds: c.binds.load(Ordering::SeqCst),
            searches: c.searches.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    type Connection = MemoryConnection;

    async fn connect(&self, _server: &ServerAddress) -> Result<MemoryConnection, DirectoryError> {
        if self.unreachable {
            return Err(ErrorKind::ConnectionFailed.into());
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            entries: Arc::clone(&self.entries),
            stats: Arc::clone(&self.stats),
            latency: self.latency,
            search_denied: self.search_denied,
            bound_as: None,
            closed: false,
        })
    }
}

/// A connection to a [`MemoryDirectory`].
#[derive(Debug)]
pub struct MemoryConnection {
    entries: Arc<Vec<StoredEntry>>,
    stats: Arc<Counters>,
    latency: Option<Duration>,
    search_denied: bool,
    bound_as: Option<String>,
    closed: bool,
}

impl MemoryConnection {
    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_open(&self) -> Result<(), DirectoryError> {
        if self.closed {
            return Err(DirectoryError::new(ErrorKind::ConnectionFailed, "connection already closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.ensure_open()?;
        self.stats.binds.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        // An empty password is an unauthenticated bind, which LDAP servers happily accept.
        if password.is_empty() {
            self.bound_as = None;
            return Ok(());
        }
        let accepted = self
            .entries
            .iter()
            .any(|stored| stored.entry.dn.eq_ignore_ascii_case(dn) && stored.password.as_deref() == Some(password));
        if !accepted {
            return Err(ErrorKind::InvalidCredentials.into());
        }
        self.bound_as = Some(dn.to_string());
        Ok(())
    }

    async fn search(&mut self, base: &str, scope: SearchScope, filter: &str, attrs: &[&str]) -> Result<Vec<Entry>, DirectoryError> {
        self.ensure_open()?;
        self.stats.searches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.bound_as.is_none() || self.search_denied {
            return Err(DirectoryError::new(ErrorKind::OperationFailed, "insufficient access rights"));
        }
        let filter = Filter::parse(filter).ok_or_else(|| DirectoryError::new(ErrorKind::OperationFailed, format!("bad search filter: {}", filter)))?;

        Ok(self
            .entries
            .iter()
            .map(|stored| &stored.entry)
            .filter(|entry| in_scope(&entry.dn, base, scope))
            .filter(|entry| filter.matches(entry))
            .map(|entry| project(entry, attrs))
            .collect())
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        self.ensure_open()?;
        self.closed = true;
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.stats.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    let (dn, base) = (dn.to_ascii_lowercase(), base.to_ascii_lowercase());
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::Subtree => base.is_empty() || dn == base || dn.ends_with(&format!(",{}", base)),
    }
}

fn project(entry: &Entry, attrs: &[&str]) -> Entry {
    if attrs.is_empty() || attrs.contains(&"*") {
        return entry.clone();
    }
    Entry {
        dn: entry.dn.clone(),
        attrs: entry
            .attrs
            .iter()
            .filter(|(name, _)| attrs.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect(),
    }
}

// The subset of RFC 4515 search filters that the memory directory understands.
#[derive(Debug, PartialEq)]
enum Filter {
    Equal(String, String),
    Present(String),
    And(Vec<Filter>),
}

impl Filter {
    fn parse(s: &str) -> Option<Filter> {
        let (filter, rest) = Filter::parse_one(s.trim())?;
        rest.is_empty().then_some(filter)
    }

    fn parse_one(s: &str) -> Option<(Filter, &str)> {
        let s = s.strip_prefix('(')?;
        if let Some(mut rest) = s.strip_prefix('&') {
            let mut parts = Vec::new();
            while rest.starts_with('(') {
                let (part, remaining) = Filter::parse_one(rest)?;
                parts.push(part);
                rest = remaining;
            }
            let rest = rest.strip_prefix(')')?;
            return Some((Filter::And(parts), rest));
        }
        let end = s.find(')')?;
        let (item, rest) = (&s[..end], &s[end + 1..]);
        let (attr, value) = item.split_once('=')?;
        if attr.is_empty() || attr.contains(['(', '*', '\\']) {
            return None;
        }
        let filter = if value == "*" {
            Filter::Present(attr.to_string())
        } else {
            Filter::Equal(attr.to_string(), unescape(value)?)
        };
        Some((filter, rest))
    }

    fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::Equal(attr, value) => entry.values(attr).iter().any(|v| v == value),
            Filter::Present(attr) => attr.eq_ignore_ascii_case("objectClass") || !entry.values(attr).is_empty(),
            Filter::And(parts) => parts.iter().all(|f| f.matches(entry)),
        }
    }
}

// Reverses RFC 4515 `\XX` escaping. Unescaped special characters make the filter invalid.
fn unescape(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut iter = value.bytes();
    while let Some(b) = iter.next() {
        match b {
            b'\\' => {
                let hex = [iter.next()?, iter.next()?];
                let hex = std::str::from_utf8(&hex).ok()?;
                bytes.push(u8::from_str_radix(hex, 16).ok()?);
            }
            b'*' | b'(' | b')' | 0 => return None,
            b => bytes.push(b),
        }
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SERVICE_DN: &str = "cn=svc,dc=example,dc=org";

    fn server() -> ServerAddress {
        ServerAddress {
            host: "localhost".into(),
            port: 389,
            use_tls: false,
        }
    }

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new()
            .with_account(SERVICE_DN, "svcpass")
            .with_user("alice", "uid=alice,ou=people,dc=example,dc=org", "correct", &["cn=admins,ou=groups,dc=example,dc=org"])
            .with_user("bob", "uid=bob,ou=people,dc=example,dc=org", "hunter2", &[])
    }

    #[test]
    fn parses_filters() {
        assert_eq!(Filter::parse("(uid=alice)"), Some(Filter::Equal("uid".into(), "alice".into())));
        assert_eq!(
            Filter::parse("(&(objectClass=*)(uid=a\\2ab))"),
            Some(Filter::And(vec![Filter::Present("objectClass".into()), Filter::Equal("uid".into(), "a*b".into())]))
        );
        assert_eq!(Filter::parse("(uid=a*)"), None);
        assert_eq!(Filter::parse("(uid=alice))"), None);
        assert_eq!(Filter::parse("uid=alice"), None);
    }

    #[tokio::test]
    async fn bind_checks_password() {
        let dir = directory();
        let mut conn = dir.connect(&server()).await.unwrap();
        assert_eq!(conn.bind(SERVICE_DN, "wrong").await.unwrap_err().kind(), ErrorKind::InvalidCredentials);
        conn.bind(SERVICE_DN, "svcpass").await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(dir.stats().binds, 2);
    }

    #[tokio::test]
    async fn search_requires_authenticated_bind() {
        let dir = directory();
        let mut conn = dir.connect(&server()).await.unwrap();
        conn.bind("", "").await.unwrap();
        let err = conn.search("dc=example,dc=org", SearchScope::Subtree, "(uid=alice)", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationFailed);
    }

    #[tokio::test]
    async fn subtree_search_projects_attributes() {
        let dir = directory();
        let mut conn = dir.connect(&server()).await.unwrap();
        conn.bind(SERVICE_DN, "svcpass").await.unwrap();
        let found = conn.search("ou=people,dc=example,dc=org", SearchScope::Subtree, "(uid=alice)", &["memberOf"]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dn, "uid=alice,ou=people,dc=example,dc=org");
        assert_eq!(found[0].attrs.len(), 1);
        assert_eq!(found[0].values("memberof"), ["cn=admins,ou=groups,dc=example,dc=org".to_string()]);

        let none = conn.search("ou=groups,dc=example,dc=org", SearchScope::Subtree, "(uid=alice)", &[]).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn base_search_only_returns_base_entry() {
        let dir = directory();
        let mut conn = dir.connect(&server()).await.unwrap();
        conn.bind("uid=bob,ou=people,dc=example,dc=org", "hunter2").await.unwrap();
        let found = conn
            .search("uid=bob,ou=people,dc=example,dc=org", SearchScope::Base, "(objectClass=*)", &["uid"])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].values("uid"), ["bob".to_string()]);
    }

    #[tokio::test]
    async fn counts_closed_and_abandoned_connections() {
        let dir = directory();
        let mut closed = dir.connect(&server()).await.unwrap();
        closed.close().await.unwrap();
        drop(closed);
        let abandoned = dir.connect(&server()).await.unwrap();
        drop(abandoned);

        let stats = dir.stats();
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.released(), stats.opened);
    }

    #[tokio::test]
    async fn unreachable_directory_refuses_connections() {
        let dir = directory().unreachable();
        let err = dir.connect(&server()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
        assert!(!dir.stats().any_io());
    }
}
