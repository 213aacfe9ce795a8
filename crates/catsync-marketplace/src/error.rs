use thiserror::Error;

/// Longest response body kept in an error, in characters.
pub(crate) const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// Missing or unusable credentials. Fatal for the whole pass.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-transient non-2xx response (4xx other than 429). Never retried.
    #[error("remote API returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// HTTP 429 or 5xx. Retried internally; callers see
    /// [`MarketplaceError::ExhaustedRetries`] once the attempt budget is spent.
    #[error("transient remote failure HTTP {status}: {body}")]
    Transient { status: u16, body: String },

    #[error("request failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: Box<MarketplaceError>,
    },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl MarketplaceError {
    /// HTTP status attached to this error, looking through retry exhaustion.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } | Self::Transient { status, .. } => Some(*status),
            Self::ExhaustedRetries { last, .. } => last.status(),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Truncates a response body to [`MAX_ERROR_BODY_CHARS`] characters.
pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_owned(),
    }
}
