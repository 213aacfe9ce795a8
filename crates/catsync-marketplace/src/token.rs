//! Bearer token resolution for the marketplace API.

use crate::error::MarketplaceError;

/// Two configured token sources; the primary wins whenever it is set.
#[derive(Clone, Default)]
pub struct Credentials {
    primary: Option<String>,
    secondary: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("primary", &self.primary.as_ref().map(|_| "[redacted]"))
            .field("secondary", &self.secondary.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl Credentials {
    #[must_use]
    pub fn new(primary: Option<String>, secondary: Option<String>) -> Self {
        Self { primary, secondary }
    }

    /// Credentials with a single token, mostly useful in tests.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::new(Some(token.into()), None)
    }

    /// Returns the token to send as the `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Config`] when neither source is set, or when
    /// the chosen token is empty once control and non-printable characters
    /// are stripped.
    pub fn resolve(&self) -> Result<String, MarketplaceError> {
        let raw = self
            .primary
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.secondary.as_deref().filter(|s| !s.is_empty()))
            .ok_or_else(|| MarketplaceError::Config("no token".to_owned()))?;

        let token = sanitize_token(raw);
        if token.is_empty() {
            return Err(MarketplaceError::Config("no token".to_owned()));
        }
        Ok(token)
    }
}

/// Strips control characters (stray newlines and BOMs from copy-pasted
/// secrets included) and surrounding whitespace.
fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control() && *c != '\u{feff}' && *c != '\u{200b}')
        .collect::<String>()
        .trim()
        .to_owned()
}
