//! Templates that turn a username into a search filter or a distinguished name.
//!
//! Both templates use the single named placeholder [`PLACEHOLDER`]. The substituted value is
//! always escaped for the target syntax, whatever the username pattern already let through.

use ldap3::{dn_escape, ldap_escape};
use std::fmt::{self, Display, Formatter};

/// The placeholder that gets replaced by the username.
pub const PLACEHOLDER: &str = "{username}";

/// A search filter such as `(&(objectClass=person)(uid={username}))`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterTemplate {
    template: String,
}

impl FilterTemplate {
    /// Returns `None` if the template lacks the [`PLACEHOLDER`].
    pub fn new(template: impl Into<String>) -> Option<Self> {
        let template = template.into();
        template.contains(PLACEHOLDER).then_some(FilterTemplate { template })
    }

    /// The filter `(<attribute>={username})`.
    pub fn for_attribute(attribute: &str) -> Self {
        FilterTemplate {
            template: format!("({}={})", attribute, PLACEHOLDER),
        }
    }

    /// Substitutes `username`, escaping the RFC 4515 special characters `*`, `(`, `)`, `\` and NUL.
    pub fn render(&self, username: &str) -> String {
        self.template.replace(PLACEHOLDER, &ldap_escape(username))
    }
}

impl Display for FilterTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// A distinguished name such as `uid={username},ou=people,dc=example,dc=org`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnTemplate {
    template: String,
}

impl DnTemplate {
    /// Returns `None` if the template lacks the [`PLACEHOLDER`].
    pub fn new(template: impl Into<String>) -> Option<Self> {
        let template = template.into();
        template.contains(PLACEHOLDER).then_some(DnTemplate { template })
    }

    /// Substitutes `username`, escaping characters that are special in an RDN value (RFC 4514).
    pub fn render(&self, username: &str) -> String {
        self.template.replace(PLACEHOLDER, &dn_escape(username))
    }
}

impl Display for DnTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}
