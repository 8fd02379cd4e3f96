//! Basic-auth credentials supplied as a single `username:password` token.

use std::fmt;
use std::str::FromStr;

use super::DownloadError;

/// Username and password for HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Parses a `username:password` token.
    ///
    /// The token must contain exactly one colon; either side may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidCredentials`] for any other shape.
    pub fn parse(token: &str) -> Result<Self, DownloadError> {
        let mut parts = token.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(username), Some(password), None) => Ok(Self {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => Err(DownloadError::InvalidCredentials),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl FromStr for Credentials {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Never print the password.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
