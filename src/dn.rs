//! Helpers for picking apart distinguished names.

use std::collections::BTreeSet;

/// Extracts the group name from a group DN: the value of its leftmost RDN.
///
/// `cn=admins,ou=groups,dc=example,dc=org` yields `admins`. Backslash-escaped commas do not end
/// the RDN. Returns `None` if the leftmost component has no `=` or an empty value.
pub fn group_name(dn: &str) -> Option<String> {
    let mut rdn = String::new();
    let mut chars = dn.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                rdn.push(c);
                if let Some(escaped) = chars.next() {
                    rdn.push(escaped);
                }
            }
            ',' => break,
            _ => rdn.push(c),
        }
    }
    let (_, value) = rdn.split_once('=')?;
    let value = unescape_value(value.trim());
    (!value.is_empty()).then_some(value)
}

/// Group names of all the given group DNs. Malformed DNs are skipped.
pub fn group_names<S: AsRef<str>>(dns: &[S]) -> BTreeSet<String> {
    dns.iter().filter_map(|dn| group_name(dn.as_ref())).collect()
}

// Drops the backslash in front of escaped special characters, e.g. `a\,b` becomes `a,b`.
// Hex escapes (`\2c`) are left as they are.
fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&next) if c == '\\' && !next.is_ascii_hexdigit() => {
                out.push(next);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}
