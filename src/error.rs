//! Error taxonomy for the session controller.
//!
//! ERROR HANDLING
//! ==============
//! Transport and provider failures are converted into state (null session or
//! profile) at the controller boundary. Only user-actionable failures from
//! explicit operations travel back to the caller for display.

// =============================================================================
// ERROR CODE
// =============================================================================

/// Stable machine-readable classification for errors shown to callers.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// AUTH ERROR
// =============================================================================

/// Errors produced by the auth provider, profile store, and controller operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The supplied email address is not usable for a sign-in link.
    #[error("invalid email")]
    InvalidEmail,

    /// The redirect target is not a site-relative path.
    #[error("invalid redirect path: {0}")]
    InvalidRedirect(String),

    /// The OAuth provider name is not one the site offers.
    #[error("unsupported oauth provider: {0}")]
    UnsupportedProvider(String),

    /// A required configuration variable is not set.
    #[error("missing config: env var {var} not set")]
    MissingConfig { var: String },

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The request to the backend failed before a response arrived.
    #[error("backend request failed: {0}")]
    Request(String),

    /// The backend returned a non-success HTTP status.
    #[error("backend response error: status {status}")]
    Response { status: u16, body: String },

    /// The backend response body could not be deserialized.
    #[error("backend response parse failed: {0}")]
    Parse(String),

    /// The provider delivered an auth change that could not be interpreted.
    #[error("malformed auth event: {0}")]
    MalformedEvent(String),

    /// The operation needs an active session.
    #[error("not signed in")]
    NotSignedIn,

    /// Reading or writing the persisted session failed.
    #[error("session storage failed: {0}")]
    Storage(String),
}

impl AuthError {
    /// True for errors caused by caller input rather than a system fault.
    ///
    /// These are returned for inline display and are not logged as failures.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidEmail | Self::InvalidRedirect(_) | Self::UnsupportedProvider(_))
    }
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "E_INVALID_EMAIL",
            Self::InvalidRedirect(_) => "E_INVALID_REDIRECT",
            Self::UnsupportedProvider(_) => "E_UNSUPPORTED_PROVIDER",
            Self::MissingConfig { .. } => "E_MISSING_CONFIG",
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Request(_) => "E_REQUEST",
            Self::Response { .. } => "E_RESPONSE",
            Self::Parse(_) => "E_PARSE",
            Self::MalformedEvent(_) => "E_MALFORMED_EVENT",
            Self::NotSignedIn => "E_NOT_SIGNED_IN",
            Self::Storage(_) => "E_STORAGE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
