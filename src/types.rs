//! Session, profile, and controller state types.
//!
//! DESIGN
//! ======
//! `Session` is owned by the auth provider and treated as opaque apart from
//! `user_id`. `Profile` is the site's own member record keyed by that id.
//! `ControllerState` is the only shape exposed to downstream consumers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

// =============================================================================
// SESSION
// =============================================================================

/// Provider-issued proof of authentication.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Subject of the session. Absent for anonymous or half-formed sessions.
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry in seconds since the Unix epoch.
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Everything else the provider sent, untouched.
    #[serde(default)]
    pub raw_claims: serde_json::Value,
}

impl Session {
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }
}

// =============================================================================
// PROFILE
// =============================================================================

/// Member record from the `profiles` table. `id` equals the session's user id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_core_member: bool,
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl Profile {
    /// Admin dashboards are open to admins and super admins.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_admin || self.is_super_admin
    }

    /// Roster edits (adding members, changing roles) need a super admin.
    #[must_use]
    pub fn can_manage_roster(&self) -> bool {
        self.is_super_admin
    }

    /// A profile without a name is treated as not yet onboarded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.full_name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

// =============================================================================
// CONTROLLER STATE
// =============================================================================

/// Snapshot published to downstream consumers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControllerState {
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    /// True until the controller has booted. Never set back to true.
    pub loading: bool,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self { session: None, profile: None, loading: true }
    }
}

/// Coarse view of `ControllerState` for route guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Booting,
    SignedOut,
    /// Authenticated, but the profile is missing or could not be fetched.
    ProfileIncomplete,
    SignedIn,
}

impl ControllerState {
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().and_then(Session::user_id)
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        if self.loading {
            return AuthStatus::Booting;
        }
        match (&self.session, &self.profile) {
            (None, _) => AuthStatus::SignedOut,
            (Some(_), Some(p)) if p.is_complete() => AuthStatus::SignedIn,
            (Some(_), _) => AuthStatus::ProfileIncomplete,
        }
    }

    /// Redirect to sign-in once booted with no session.
    #[must_use]
    pub fn requires_sign_in(&self) -> bool {
        !self.loading && self.session.is_none()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(Profile::is_admin)
    }

    #[must_use]
    pub fn is_core_member(&self) -> bool {
        self.profile.as_ref().is_some_and(|p| p.is_core_member || p.is_admin())
    }
}

// =============================================================================
// AUTH EVENTS
// =============================================================================

/// Change notifications emitted by the auth provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    #[must_use]
    pub fn signed_in(session: Session) -> Self {
        Self { kind: AuthEventKind::SignedIn, session: Some(session) }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { kind: AuthEventKind::SignedOut, session: None }
    }
}

// =============================================================================
// SIGN-IN OPTIONS
// =============================================================================

/// OAuth providers offered on the sign-in page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    GitHub,
    Facebook,
    Apple,
}

impl OAuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
            Self::Facebook => "facebook",
            Self::Apple => "apple",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            "facebook" => Ok(Self::Facebook),
            "apple" => Ok(Self::Apple),
            other => Err(AuthError::UnsupportedProvider(other.to_owned())),
        }
    }
}

/// Which sessions a sign-out revokes on the provider side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SignOutScope {
    /// Only this device's session.
    #[default]
    Local,
    /// Every session for the user.
    Global,
}

impl SignOutScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
