mod support;

use std::sync::Arc;
use std::time::Duration;

use farmgate::guard::{Guard, MemoryNavigator, Navigator};
use farmgate::net::types::Credentials;
use farmgate::session::{FailureReason, Phase};
use farmgate::signal::AuthSignal;
use farmgate::storage::{self, MemoryStore};
use farmgate::view::{LOADING_PLACEHOLDER, render_outcome, render_status};
use support::{Client, MockApi};

// =============================================================
// bootstrap
// =============================================================

#[tokio::test]
async fn valid_token_without_player_lands_on_setup() {
    let mock = MockApi::start().await;
    mock.add_user("valid.jwt.token", 1, "farmer@farm.test", None);
    let client = Client::new(&mock, MemoryStore::with_token("valid.jwt.token"));
    let navigator = Arc::new(MemoryNavigator::new("/game"));
    let guard = Guard::new(Arc::clone(&client.session), navigator.clone());

    let state = client.session.mount().await;
    assert_eq!(state.phase, Phase::Authenticated);
    assert_eq!(state.user().map(|u| u.email.as_str()), Some("farmer@farm.test"));

    let outcome = guard.evaluate_player(|_, _| "farm".to_owned());
    assert_eq!(outcome.redirect().map(|r| r.path.as_str()), Some("/character"));
    assert_eq!(navigator.current_path(), "/character");
    assert_eq!(mock.validate_calls(), 1);
}

#[tokio::test]
async fn rejected_token_is_cleared() {
    let mock = MockApi::start().await;
    let client = Client::new(&mock, MemoryStore::with_token("invalid.jwt"));

    let state = client.session.mount().await;
    assert_eq!(state.phase, Phase::Unauthenticated);
    assert_eq!(state.failure, Some(FailureReason::InvalidSession));
    assert_eq!(storage::read_token(client.store.as_ref()).unwrap(), None);
    assert!(render_status(&state).contains("not authenticated"));
}

#[tokio::test]
async fn expired_token_reports_expiry() {
    let mock = MockApi::start().await;
    mock.add_user("old.jwt", 1, "farmer@farm.test", Some(5));
    mock.expire("old.jwt");
    let client = Client::new(&mock, MemoryStore::with_token("old.jwt"));

    let state = client.session.mount().await;
    assert_eq!(state.failure, Some(FailureReason::SessionExpired));
    assert_eq!(storage::read_token(client.store.as_ref()).unwrap(), None);
}

#[tokio::test]
async fn no_token_makes_no_network_call() {
    let mock = MockApi::start().await;
    let client = Client::new(&mock, MemoryStore::new());

    let state = client.session.mount().await;
    assert_eq!(state.phase, Phase::Unauthenticated);
    assert_eq!(state.failure, None);
    assert_eq!(mock.validate_calls(), 0);
}

#[tokio::test]
async fn guard_shows_loading_until_validation_returns() {
    let mock = MockApi::start().await;
    mock.add_user("slow.jwt", 1, "farmer@farm.test", Some(9));
    mock.set_validate_delay(Duration::from_millis(300));
    let client = Client::new(&mock, MemoryStore::with_token("slow.jwt"));
    let navigator = Arc::new(MemoryNavigator::new("/game"));
    let guard = Guard::new(Arc::clone(&client.session), navigator.clone());

    let mount = client.session.spawn_mount().expect("first mount");
    let outcome = guard.evaluate(|u| u.email.clone());
    assert_eq!(render_outcome(&outcome), LOADING_PLACEHOLDER);

    mount.await.unwrap();
    let outcome = guard.evaluate_player(|_, player_id| format!("player {player_id}"));
    assert_eq!(outcome.rendered().as_deref(), Some("player 9"));
    assert_eq!(navigator.history(), vec!["/game".to_owned()]);
}

#[tokio::test]
async fn unreachable_server_keeps_nothing() {
    let mock = MockApi::start().await;
    let mut config = mock.config();
    config.api_base_url = "http://127.0.0.1:9".to_owned();
    let store: Arc<dyn storage::CredentialStore> = Arc::new(MemoryStore::with_token("any.jwt"));
    let api = Arc::new(farmgate::net::api::ApiClient::new(&config, Arc::clone(&store)).unwrap());
    let session = farmgate::session::SessionManager::new(
        api,
        Arc::clone(&store),
        Arc::new(farmgate::cache::QueryCache::new()),
        config.routes.clone(),
    );

    let state = session.mount().await;
    assert_eq!(state.failure, Some(FailureReason::NetworkUnavailable));
    assert_eq!(storage::read_token(store.as_ref()).unwrap(), None);
}

// =============================================================
// login / register
// =============================================================

#[tokio::test]
async fn login_over_form_then_validates_new_token() {
    let mock = MockApi::start().await;
    mock.add_user("fresh.jwt", 7, "farmer@farm.test", Some(70));
    mock.add_account("farmer@farm.test", "hunter2", "fresh.jwt");
    let client = Client::new(&mock, MemoryStore::new());
    client.session.mount().await;

    let user = client
        .session
        .login(&Credentials::new("farmer@farm.test", "hunter2"))
        .await
        .unwrap();
    assert_eq!(user.player_id, Some(70));
    assert_eq!(storage::read_token(client.store.as_ref()).unwrap().as_deref(), Some("fresh.jwt"));
    assert_eq!(storage::read_cached_user(client.store.as_ref()).unwrap(), Some(user));
    assert_eq!(mock.login_calls(), 1);
    assert_eq!(mock.validate_calls(), 1);
    assert!(client.session.state().is_authenticated());
}

#[tokio::test]
async fn wrong_password_is_reported() {
    let mock = MockApi::start().await;
    mock.add_user("fresh.jwt", 7, "farmer@farm.test", None);
    mock.add_account("farmer@farm.test", "hunter2", "fresh.jwt");
    let client = Client::new(&mock, MemoryStore::new());
    client.session.mount().await;

    let err = client
        .session
        .login(&Credentials::new("farmer@farm.test", "nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, FailureReason::LoginFailed(_)));
    assert_eq!(client.session.state().phase, Phase::Unauthenticated);
}

#[tokio::test]
async fn register_signs_in_new_account() {
    let mock = MockApi::start().await;
    let client = Client::new(&mock, MemoryStore::new());
    client.session.mount().await;
    let credentials = Credentials::new("new@farm.test", "seeds");

    let user = client.session.register(&credentials).await.unwrap();
    assert_eq!(user.email, "new@farm.test");
    assert_eq!(user.player_id, None);
    assert!(client.session.state().is_authenticated());

    client.session.logout();
    let err = client.session.register(&credentials).await.unwrap_err();
    assert_eq!(err, FailureReason::RegistrationFailed("Email already registered".to_owned()));
}

// =============================================================
// invalidation
// =============================================================

#[tokio::test]
async fn rejected_api_call_signals_and_redirects() {
    let mock = MockApi::start().await;
    mock.add_user("live.jwt", 3, "farmer@farm.test", Some(30));
    let mut client = Client::new(&mock, MemoryStore::with_token("live.jwt"));
    client.session.mount().await;
    assert!(client.session.state().is_authenticated());

    mock.revoke("live.jwt");
    let result: Result<serde_json::Value, _> = client.api.get_json("/players/3/profile").await;
    assert!(result.is_err());

    let invalidation = client.signals.try_recv().expect("signal queued");
    assert_eq!(invalidation.signal, AuthSignal::Unauthorized);
    assert_eq!(invalidation.credential.as_deref(), Some("live.jwt"));

    let navigator = MemoryNavigator::new("/game");
    let redirect = client
        .session
        .handle_signal(invalidation, &navigator.current_path())
        .expect("redirect away from game");
    navigator.push(&redirect);
    assert_eq!(navigator.current_path(), "/auth?redirected=true&reason=unauthorized&from=%2Fgame");
    assert_eq!(client.session.state().failure, Some(FailureReason::Unauthorized));
    assert_eq!(storage::read_token(client.store.as_ref()).unwrap(), None);
}

#[tokio::test]
async fn expired_api_call_signals_expiry() {
    let mock = MockApi::start().await;
    mock.add_user("live.jwt", 3, "farmer@farm.test", Some(30));
    let mut client = Client::new(&mock, MemoryStore::with_token("live.jwt"));
    client.session.mount().await;

    mock.expire("live.jwt");
    let result: Result<serde_json::Value, _> = client.api.get_json("/players/3/progress").await;
    assert!(result.is_err());
    assert_eq!(client.signals.try_recv().map(|i| i.signal), Some(AuthSignal::TokenExpired));
}

#[tokio::test]
async fn late_rejection_of_old_token_spares_new_login() {
    let mock = MockApi::start().await;
    mock.add_user("old.jwt", 1, "farmer@farm.test", Some(10));
    mock.add_user("new.jwt", 1, "farmer@farm.test", Some(10));
    mock.add_account("farmer@farm.test", "hunter2", "new.jwt");
    let mut client = Client::new(&mock, MemoryStore::with_token("old.jwt"));
    client.session.mount().await;

    mock.revoke("old.jwt");
    let result: Result<serde_json::Value, _> = client.api.get_json("/players/1/profile").await;
    assert!(result.is_err());

    client
        .session
        .login(&Credentials::new("farmer@farm.test", "hunter2"))
        .await
        .unwrap();

    let navigator = MemoryNavigator::new("/game");
    while let Some(invalidation) = client.signals.try_recv() {
        if let Some(redirect) = client.session.handle_signal(invalidation, &navigator.current_path()) {
            navigator.push(&redirect);
        }
    }

    assert_eq!(client.session.state().phase, Phase::Authenticated);
    assert_eq!(storage::read_token(client.store.as_ref()).unwrap().as_deref(), Some("new.jwt"));
    assert_eq!(navigator.history(), vec!["/game".to_owned()]);
}
