use std::fmt;

/// A password supplied by a client. Never shows its content when formatted.
#[derive(PartialEq, Eq, Clone)]
pub struct Password {
    secret: String,
}

impl Password {
    /// Wraps the given secret.
    pub fn new(secret: String) -> Self {
        Password { secret }
    }

    /// The password text.
    pub fn as_str(&self) -> &str {
        &self.secret
    }

    /// true if the password is empty or consists of whitespace only.
    pub fn is_blank(&self) -> bool {
        self.secret.trim().is_empty()
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*******")
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password {{ secret: ******* }}")
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(String::from(s))
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for Password {
    fn as_ref(&self) -> &str {
        &self.secret
    }
}
