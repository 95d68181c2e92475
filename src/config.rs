//! Contains the configuration of the LDAP authenticator.
//!
//! The [`Builder`] collects settings, either through its `with_*` methods or by deserializing a
//! JSON document, and validates them into an immutable [`LdapConfig`]. Validation happens once,
//! at startup: an authenticator that got built is guaranteed to have everything its DN
//! resolution mode needs.

use crate::directory::{DirectoryClient, LdapDirectory, ServerAddress};
use crate::error::ConfigError;
use crate::template::{DnTemplate, FilterTemplate};
use crate::LdapAuthenticator;
use dirauth_core::auth::Password;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt::{self, Debug, Formatter};
use std::{fs, path::Path};

/// The pattern usernames must match unless configured otherwise: a lowercase letter followed by
/// lowercase letters, digits, `.`, `_` or `-`.
pub const DEFAULT_USERNAME_PATTERN: &str = r"^[a-z][.a-z0-9_-]*$";
/// The attribute listing the groups an entry is a member of, unless configured otherwise.
pub const DEFAULT_MEMBERSHIP_ATTRIBUTE: &str = "memberOf";
/// Port used for plain LDAP when none is configured.
pub const DEFAULT_LDAP_PORT: u16 = 389;
/// Port used for LDAP over TLS when none is configured.
pub const DEFAULT_LDAPS_PORT: u16 = 636;

/// Used to build the [`LdapAuthenticator`].
///
/// The same fields can be given in JSON, see [`Builder::from_json`]. Example for a directory that
/// needs a lookup to find the user's DN:
///
/// ```json
/// {
///   "server_address": "ldap.example.org",
///   "bind_dn": "cn=reader,dc=example,dc=org",
///   "bind_password": "secret",
///   "lookup_dn": true,
///   "user_search_base": "ou=people,dc=example,dc=org",
///   "user_attribute": "uid",
///   "allowed_groups": ["admins"]
/// }
/// ```
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Builder {
    server_address: String,
    server_port: Option<u16>,
    use_ssl: bool,
    bind_dn: Option<String>,
    bind_password: Option<String>,
    bind_dn_template: Option<String>,
    lookup_dn: bool,
    user_search_base: Option<String>,
    user_search_filter: Option<String>,
    user_attribute: Option<String>,
    membership_attribute: String,
    valid_username_regex: String,
    allowed_groups: Vec<String>,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            server_address: String::new(),
            server_port: None,
            use_ssl: true,
            bind_dn: None,
            bind_password: None,
            bind_dn_template: None,
            lookup_dn: false,
            user_search_base: None,
            user_search_filter: None,
            user_attribute: None,
            membership_attribute: DEFAULT_MEMBERSHIP_ATTRIBUTE.to_string(),
            valid_username_regex: DEFAULT_USERNAME_PATTERN.to_string(),
            allowed_groups: Vec::new(),
        }
    }
}

impl Debug for Builder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("server_address", &self.server_address)
            .field("server_port", &self.server_port)
            .field("use_ssl", &self.use_ssl)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "*******"))
            .field("bind_dn_template", &self.bind_dn_template)
            .field("lookup_dn", &self.lookup_dn)
            .field("user_search_base", &self.user_search_base)
            .field("user_search_filter", &self.user_search_filter)
            .field("user_attribute", &self.user_attribute)
            .field("membership_attribute", &self.membership_attribute)
            .field("valid_username_regex", &self.valid_username_regex)
            .field("allowed_groups", &self.allowed_groups)
            .finish()
    }
}

impl Builder {
    /// Creates a new `Builder` with default settings: TLS on, the default username pattern,
    /// `memberOf` as membership attribute and no allow-list.
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Reads the settings from a JSON file.
    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Builder, ConfigError> {
        let json = fs::read_to_string(filename)?;
        Builder::from_json(json)
    }

    /// Reads the settings from a JSON string. Absent fields keep their defaults, unknown fields
    /// are an error.
    pub fn from_json<T: AsRef<str>>(json: T) -> Result<Builder, ConfigError> {
        Ok(serde_json::from_str(json.as_ref())?)
    }

    /// Host name or IP address of the directory server
    pub fn with_server_address(mut self, address: impl Into<String>) -> Self {
        self.server_address = address.into();
        self
    }

    /// Port of the directory server. Defaults to 636 with TLS and 389 without.
    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = Some(port);
        self
    }

    /// Whether to connect using LDAP over TLS. On by default.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_ssl = use_tls;
        self
    }

    /// The service identity used to look up users when [`with_lookup_dn`](Builder::with_lookup_dn)
    /// is on.
    pub fn with_bind_credentials(mut self, dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = Some(dn.into());
        self.bind_password = Some(password.into());
        self
    }

    /// Template from which the user's DN is built, e.g. `uid={username},ou=people,dc=example,dc=org`.
    /// Only used when DN lookup is off.
    pub fn with_bind_dn_template(mut self, template: impl Into<String>) -> Self {
        self.bind_dn_template = Some(template.into());
        self
    }

    /// Look up the user's DN with a search instead of building it from a template.
    pub fn with_lookup_dn(mut self, lookup: bool) -> Self {
        self.lookup_dn = lookup;
        self
    }

    /// Base DN below which users are searched for.
    pub fn with_user_search_base(mut self, base: impl Into<String>) -> Self {
        self.user_search_base = Some(base.into());
        self
    }

    /// Filter used to search for the user, containing the `{username}` placeholder, e.g.
    /// `(&(objectClass=person)(sAMAccountName={username}))`. Takes precedence over
    /// [`with_user_attribute`](Builder::with_user_attribute).
    pub fn with_user_search_filter(mut self, filter: impl Into<String>) -> Self {
        self.user_search_filter = Some(filter.into());
        self
    }

    /// Attribute holding the username, e.g. `uid` or `sAMAccountName`. Searches then use the
    /// filter `(<attribute>={username})`.
    pub fn with_user_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.user_attribute = Some(attribute.into());
        self
    }

    /// Multi-valued attribute listing the DNs of the groups a user is a member of.
    pub fn with_membership_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.membership_attribute = attribute.into();
        self
    }

    /// Regular expression usernames must match before anything is sent to the directory.
    ///
    /// This is the first line of defense against LDAP injection: make sure a custom pattern still
    /// rejects `*`, `(`, `)`, `\` and friends.
    pub fn with_username_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.valid_username_regex = pattern.into();
        self
    }

    /// Names of the groups whose members may log in. An empty list lets every authenticated
    /// user in.
    pub fn with_allowed_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Validates the settings and creates an authenticator that talks LDAP.
    pub fn build(self) -> Result<LdapAuthenticator<LdapDirectory>, ConfigError> {
        self.build_with_client(LdapDirectory::new())
    }

    /// Validates the settings and creates an authenticator that uses the given directory client.
    pub fn build_with_client<C: DirectoryClient>(self, client: C) -> Result<LdapAuthenticator<C>, ConfigError> {
        Ok(LdapAuthenticator::new(self.validate()?, client))
    }

    /// Validates the settings into an [`LdapConfig`].
    pub fn validate(self) -> Result<LdapConfig, ConfigError> {
        if self.server_address.trim().is_empty() {
            return Err(ConfigError::MissingField("server_address"));
        }
        let port = match self.server_port {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    field: "server_port",
                    reason: "port 0 is not connectable".to_string(),
                });
            }
            Some(port) => port,
            None if self.use_ssl => DEFAULT_LDAPS_PORT,
            None => DEFAULT_LDAP_PORT,
        };
        if !is_attribute_name(&self.membership_attribute) {
            return Err(ConfigError::InvalidValue {
                field: "membership_attribute",
                reason: format!("'{}' is not an attribute name", self.membership_attribute),
            });
        }
        // The bare pattern must compile on its own, so a stray `)` cannot escape the anchors.
        let bare = Regex::new(&self.valid_username_regex)?;
        let username_pattern = Regex::new(&format!("^(?:{})$", bare.as_str()))?;

        let resolution = if self.lookup_dn {
            if self.bind_dn_template.is_some() {
                return Err(ConfigError::ConflictingMode("bind_dn_template"));
            }
            let filter = match (self.user_search_filter, self.user_attribute) {
                (Some(filter), _) => FilterTemplate::new(filter).ok_or(ConfigError::MissingPlaceholder("user_search_filter"))?,
                (None, Some(attribute)) if is_attribute_name(&attribute) => FilterTemplate::for_attribute(&attribute),
                (None, Some(attribute)) => {
                    return Err(ConfigError::InvalidValue {
                        field: "user_attribute",
                        reason: format!("'{}' is not an attribute name", attribute),
                    });
                }
                (None, None) => return Err(ConfigError::MissingField("user_search_filter")),
            };
            DnResolution::Search(UserSearch {
                bind_dn: required(self.bind_dn, "bind_dn")?,
                bind_password: Password::new(required(self.bind_password, "bind_password")?),
                base: required(self.user_search_base, "user_search_base")?,
                filter,
            })
        } else {
            let template = required(self.bind_dn_template, "bind_dn_template")?;
            DnResolution::Template(DnTemplate::new(template).ok_or(ConfigError::MissingPlaceholder("bind_dn_template"))?)
        };

        let allowed_groups: BTreeSet<String> = self.allowed_groups.into_iter().collect();

        Ok(LdapConfig {
            server: ServerAddress {
                host: self.server_address,
                port,
                use_tls: self.use_ssl,
            },
            resolution,
            membership_attribute: self.membership_attribute,
            username_pattern,
            allowed_groups: (!allowed_groups.is_empty()).then_some(allowed_groups),
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value.filter(|v| !v.trim().is_empty()).ok_or(ConfigError::MissingField(field))
}

// RFC 4512 attribute descriptions: a letter followed by letters, digits and hyphens, optionally
// with `;` options.
fn is_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic()) && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ';')
}

/// The validated, immutable configuration of an [`LdapAuthenticator`].
#[derive(Debug)]
pub struct LdapConfig {
    server: ServerAddress,
    resolution: DnResolution,
    membership_attribute: String,
    username_pattern: Regex,
    allowed_groups: Option<BTreeSet<String>>,
}

impl LdapConfig {
    /// The directory server to connect to.
    pub fn server(&self) -> &ServerAddress {
        &self.server
    }

    /// How user DNs are found.
    pub fn resolution(&self) -> &DnResolution {
        &self.resolution
    }

    /// The attribute listing group memberships.
    pub fn membership_attribute(&self) -> &str {
        &self.membership_attribute
    }

    /// The group allow-list, if one is configured.
    pub fn allowed_groups(&self) -> Option<&BTreeSet<String>> {
        self.allowed_groups.as_ref()
    }

    /// true if the whole of `username` matches the username pattern.
    pub fn is_valid_username(&self, username: &str) -> bool {
        self.username_pattern.is_match(username)
    }
}

/// How the DN of a user is determined. Exactly one mode is in effect.
#[derive(Debug)]
pub enum DnResolution {
    /// The DN is built by substituting the username into a template.
    Template(DnTemplate),
    /// The DN is looked up with a search, using a service identity.
    Search(UserSearch),
}

/// Settings for looking up users with a directory search.
#[derive(Debug)]
pub struct UserSearch {
    pub(crate) bind_dn: String,
    pub(crate) bind_password: Password,
    pub(crate) base: String,
    pub(crate) filter: FilterTemplate,
}

impl UserSearch {
    /// The DN of the service identity.
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// The base DN below which users are searched.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The search filter.
    pub fn filter(&self) -> &FilterTemplate {
        &self.filter
    }
}
