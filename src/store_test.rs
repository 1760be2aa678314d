use std::time::Duration;

use super::*;
use crate::test_helpers::{self, MockProfiles, MockProvider, ProfileReply};

const SITE: &str = "https://fellowship.example/";

fn store_with(provider: &Arc<MockProvider>, profiles: &Arc<MockProfiles>) -> SessionStore {
    SessionStore::new(provider.clone(), profiles.clone(), SITE)
}

// =============================================================================
// input helpers
// =============================================================================

#[test]
fn normalize_email_accepts_basic_address() {
    assert_eq!(normalize_email("  Brother@Example.org "), Some("brother@example.org".to_owned()));
}

#[test]
fn normalize_email_rejects_invalid_values() {
    assert_eq!(normalize_email(""), None);
    assert_eq!(normalize_email("brother"), None);
    assert_eq!(normalize_email("@example.org"), None);
    assert_eq!(normalize_email("brother@"), None);
    assert_eq!(normalize_email("a@b@c"), None);
    assert_eq!(normalize_email("a b@example.org"), None);
}

#[test]
fn redirect_url_joins_site_and_path() {
    assert_eq!(redirect_url(SITE, "/dashboard").unwrap(), "https://fellowship.example/dashboard");
    assert_eq!(redirect_url("https://fellowship.example", "/").unwrap(), "https://fellowship.example/");
}

#[test]
fn redirect_url_rejects_offsite_targets() {
    for bad in ["dashboard", "//evil.example/x", "https://evil.example", "/\\evil.example"] {
        assert!(matches!(redirect_url(SITE, bad), Err(AuthError::InvalidRedirect(_))), "{bad}");
    }
}

// =============================================================================
// sign-in operations
// =============================================================================

#[tokio::test]
async fn sign_in_with_email_requests_link_without_touching_state() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);

    store.sign_in_with_email("Brother@Example.org", "/races").await.unwrap();

    assert_eq!(provider.calls(), vec!["email_link brother@example.org https://fellowship.example/races"]);
    assert_eq!(store.snapshot(), ControllerState::default());
}

#[tokio::test]
async fn sign_in_with_email_rejects_bad_input_before_calling_provider() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);

    assert!(matches!(store.sign_in_with_email("nope", "/").await, Err(AuthError::InvalidEmail)));
    assert!(matches!(
        store.sign_in_with_email("a@b.org", "//evil").await,
        Err(AuthError::InvalidRedirect(_))
    ));
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn sign_in_with_oauth_returns_authorize_url() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);

    let url = store
        .sign_in_with_oauth(OAuthProvider::Google, "/welcome")
        .await
        .unwrap();

    assert!(url.contains("provider=google"));
    assert_eq!(provider.calls(), vec!["oauth google https://fellowship.example/welcome"]);
    assert!(store.snapshot().session.is_none());
}

// =============================================================================
// sign_out
// =============================================================================

#[tokio::test]
async fn sign_out_clears_local_state_and_scopes_to_device() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let ticket = store.commit_session(Some(test_helpers::session("u1"))).unwrap();
    store.commit_profile(&ticket, Some(test_helpers::profile("u1")));

    store.sign_out().await.unwrap();

    let state = store.snapshot();
    assert!(state.session.is_none());
    assert!(state.profile.is_none());
    assert!(!state.loading);
    assert_eq!(provider.calls(), vec!["sign_out local"]);
}

#[tokio::test]
async fn sign_out_clears_local_state_even_when_remote_fails() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    store.commit_session(Some(test_helpers::session("u1")));
    provider.fail_sign_out(AuthError::Request("offline".into()));

    let result = store.sign_out().await;

    assert!(matches!(result, Err(AuthError::Request(_))));
    let state = store.snapshot();
    assert!(state.session.is_none());
    assert!(state.profile.is_none());
    assert!(!state.loading);
}

#[tokio::test]
async fn sign_out_when_signed_out_is_a_quiet_no_op() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    store.commit_session(None);
    let before = store.snapshot();

    store.sign_out().await.unwrap();
    store.sign_out().await.unwrap();

    assert_eq!(store.snapshot(), before);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn sign_out_before_boot_still_asks_provider() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    assert!(store.snapshot().loading);

    store.sign_out().await.unwrap();

    assert_eq!(provider.calls(), vec!["sign_out local"]);
    assert_eq!(store.snapshot(), ControllerState { session: None, profile: None, loading: false });
}

#[tokio::test(start_paused = true)]
async fn clear_profile_cancels_fetch_but_not_session_ticket() {
    let (provider, profiles) = test_helpers::mocks();
    profiles.found("u1", Duration::from_millis(50));
    let store = Arc::new(store_with(&provider, &profiles));
    let probe = store.guard().ticket(None);

    store.clear_profile();
    assert!(store.guard().is_current(&probe));
    assert!(store.snapshot().loading);

    let ticket = store.commit_session(Some(test_helpers::session("u1"))).unwrap();
    let loader = {
        let store = store.clone();
        tokio::spawn(async move { store.load_profile(ticket).await })
    };
    tokio::task::yield_now().await;
    store.clear_profile();
    loader.await.unwrap().unwrap();

    let state = store.snapshot();
    assert_eq!(state.user_id(), Some("u1"));
    assert!(state.profile.is_none());
    assert!(!state.loading);
}

#[tokio::test(start_paused = true)]
async fn sign_out_discards_in_flight_profile_fetch() {
    let (provider, profiles) = test_helpers::mocks();
    profiles.found("u1", Duration::from_millis(50));
    let store = Arc::new(store_with(&provider, &profiles));
    let ticket = store.commit_session(Some(test_helpers::session("u1"))).unwrap();

    let loader = {
        let store = store.clone();
        tokio::spawn(async move { store.load_profile(ticket).await })
    };
    tokio::task::yield_now().await;
    store.sign_out().await.unwrap();
    loader.await.unwrap().unwrap();

    assert!(store.snapshot().profile.is_none());
    assert!(store.snapshot().session.is_none());
}

// =============================================================================
// refresh_profile
// =============================================================================

#[tokio::test]
async fn refresh_profile_without_session_does_nothing() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);

    store.refresh_profile().await.unwrap();

    assert!(profiles.fetches().is_empty());
}

#[tokio::test]
async fn refresh_profile_picks_up_changes() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let ticket = store.commit_session(Some(test_helpers::session("u1"))).unwrap();
    store.commit_profile(&ticket, Some(test_helpers::profile("u1")));

    let mut updated = test_helpers::profile("u1");
    updated.bio = Some("Runs the Saturday ruck.".into());
    profiles.set("u1", Duration::ZERO, ProfileReply::Found(updated.clone()));
    store.refresh_profile().await.unwrap();

    assert_eq!(store.snapshot().profile, Some(updated));
}

#[tokio::test]
async fn refresh_profile_failure_keeps_session_and_clears_profile() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let ticket = store.commit_session(Some(test_helpers::session("u1"))).unwrap();
    store.commit_profile(&ticket, Some(test_helpers::profile("u1")));
    profiles.set("u1", Duration::ZERO, ProfileReply::Fail);

    assert!(store.refresh_profile().await.is_err());

    let state = store.snapshot();
    assert_eq!(state.user_id(), Some("u1"));
    assert!(state.profile.is_none());
}

// =============================================================================
// guarded writes
// =============================================================================

#[test]
fn commit_session_for_other_user_clears_profile() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let ticket = store.commit_session(Some(test_helpers::session("u1"))).unwrap();
    store.commit_profile(&ticket, Some(test_helpers::profile("u1")));

    store.commit_session(Some(test_helpers::session("u2")));

    let state = store.snapshot();
    assert_eq!(state.user_id(), Some("u2"));
    assert!(state.profile.is_none());
}

#[test]
fn commit_session_for_same_user_keeps_profile() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let ticket = store.commit_session(Some(test_helpers::session("u1"))).unwrap();
    store.commit_profile(&ticket, Some(test_helpers::profile("u1")));

    let mut refreshed = test_helpers::session("u1");
    refreshed.access_token = Some("rotated".into());
    store.commit_session(Some(refreshed));

    assert_eq!(store.snapshot().profile.map(|p| p.id), Some("u1".to_owned()));
}

#[test]
fn commit_session_without_user_ends_boot() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let ticket = store.commit_session(None).unwrap();
    assert_eq!(ticket.user_id, None);
    assert!(!store.snapshot().loading);
}

#[test]
fn stale_profile_is_not_written() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let stale = store.commit_session(Some(test_helpers::session("u1"))).unwrap();
    store.commit_session(Some(test_helpers::session("u2")));

    assert!(!store.commit_profile(&stale, Some(test_helpers::profile("u1"))));

    let state = store.snapshot();
    assert!(state.profile.is_none());
    assert!(state.loading);
}

#[test]
fn fail_closed_respects_newer_resolution() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let probe = store.guard().ticket(None);
    store.commit_session(Some(test_helpers::session("u2")));

    assert!(!store.fail_closed(&probe));
    assert_eq!(store.snapshot().user_id(), Some("u2"));
}

#[tokio::test]
async fn mismatched_profile_row_is_ignored() {
    let (provider, profiles) = test_helpers::mocks();
    profiles.set("u1", Duration::ZERO, ProfileReply::Found(test_helpers::profile("u9")));
    let store = store_with(&provider, &profiles);
    let ticket = store.commit_session(Some(test_helpers::session("u1"))).unwrap();

    store.load_profile(ticket).await.unwrap();

    assert!(store.snapshot().profile.is_none());
    assert!(!store.snapshot().loading);
}

#[test]
fn unmounted_store_ignores_writes() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    store.guard().unmount();

    assert!(store.commit_session(Some(test_helpers::session("u1"))).is_none());
    assert_eq!(store.snapshot(), ControllerState::default());
}

#[tokio::test]
async fn subscribers_see_updates() {
    let (provider, profiles) = test_helpers::mocks();
    let store = store_with(&provider, &profiles);
    let mut rx = store.subscribe();

    store.commit_session(None);

    rx.changed().await.unwrap();
    assert!(!rx.borrow().loading);
}
