use super::*;

fn session(user_id: &str) -> Session {
    Session {
        user_id: Some(user_id.to_owned()),
        access_token: Some("token".to_owned()),
        ..Session::default()
    }
}

fn profile(id: &str, name: Option<&str>) -> Profile {
    Profile { id: id.to_owned(), full_name: name.map(str::to_owned), ..Profile::default() }
}

// =============================================================================
// Session
// =============================================================================

#[test]
fn session_user_id_ignores_empty_string() {
    let mut s = session("");
    assert_eq!(s.user_id(), None);
    s.user_id = Some("u1".into());
    assert_eq!(s.user_id(), Some("u1"));
}

#[test]
fn session_deserializes_without_optional_fields() {
    let s: Session = serde_json::from_str(r#"{"user_id":"u1","access_token":"t"}"#).unwrap();
    assert_eq!(s.user_id(), Some("u1"));
    assert!(s.refresh_token.is_none());
    assert!(s.raw_claims.is_null());
}

// =============================================================================
// Profile
// =============================================================================

#[test]
fn profile_role_flags_default_false() {
    let p: Profile = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
    assert!(!p.is_admin());
    assert!(!p.can_manage_roster());
    assert!(!p.is_complete());
}

#[test]
fn super_admin_counts_as_admin() {
    let p = Profile { is_super_admin: true, ..profile("u1", Some("Sam")) };
    assert!(p.is_admin());
    assert!(p.can_manage_roster());
}

#[test]
fn blank_name_is_incomplete() {
    assert!(!profile("u1", Some("   ")).is_complete());
    assert!(profile("u1", Some("Sam")).is_complete());
}

// =============================================================================
// ControllerState
// =============================================================================

#[test]
fn default_state_is_loading() {
    let state = ControllerState::default();
    assert!(state.loading);
    assert_eq!(state.status(), AuthStatus::Booting);
    assert!(!state.requires_sign_in());
}

#[test]
fn signed_out_after_boot_requires_sign_in() {
    let state = ControllerState { loading: false, ..ControllerState::default() };
    assert_eq!(state.status(), AuthStatus::SignedOut);
    assert!(state.requires_sign_in());
}

#[test]
fn session_without_profile_is_not_signed_out() {
    let state = ControllerState { session: Some(session("u1")), profile: None, loading: false };
    assert_eq!(state.status(), AuthStatus::ProfileIncomplete);
    assert!(!state.requires_sign_in());
    assert_eq!(state.user_id(), Some("u1"));
}

#[test]
fn complete_profile_is_signed_in() {
    let state = ControllerState {
        session: Some(session("u1")),
        profile: Some(profile("u1", Some("Sam"))),
        loading: false,
    };
    assert_eq!(state.status(), AuthStatus::SignedIn);
}

#[test]
fn core_member_includes_admins() {
    let mut p = profile("u1", Some("Sam"));
    p.is_admin = true;
    let state = ControllerState { session: Some(session("u1")), profile: Some(p), loading: false };
    assert!(state.is_admin());
    assert!(state.is_core_member());
}

// =============================================================================
// AuthEvent / OAuthProvider
// =============================================================================

#[test]
fn event_kind_uses_provider_vocabulary() {
    let json = serde_json::to_string(&AuthEventKind::TokenRefreshed).unwrap();
    assert_eq!(json, "\"TOKEN_REFRESHED\"");
    let kind: AuthEventKind = serde_json::from_str("\"SIGNED_OUT\"").unwrap();
    assert_eq!(kind, AuthEventKind::SignedOut);
}

#[test]
fn oauth_provider_parses_case_insensitively() {
    assert_eq!("Google".parse::<OAuthProvider>().unwrap(), OAuthProvider::Google);
    assert_eq!(" github ".parse::<OAuthProvider>().unwrap(), OAuthProvider::GitHub);
    assert!(matches!(
        "myspace".parse::<OAuthProvider>(),
        Err(AuthError::UnsupportedProvider(name)) if name == "myspace"
    ));
}

#[test]
fn sign_out_scope_defaults_to_local() {
    assert_eq!(SignOutScope::default(), SignOutScope::Local);
    assert_eq!(SignOutScope::Global.as_str(), "global");
}
