use super::*;
use crate::store::MemoryTokenStore;
use std::sync::atomic::AtomicUsize;
use tokio::sync::Notify;

const KEY: &str = "token";

fn ann() -> UserProfile {
    UserProfile { id: "1".into(), name: "Ann".into(), email: "a@x.com".into() }
}

fn bob() -> UserProfile {
    UserProfile { id: "2".into(), name: "Bob".into(), email: "b@x.com".into() }
}

/// Scripted stand-in for the remote API.
///
/// Logins for `slow@x.com` park until `release` is notified, and verification
/// of the `parked` token waits for `release_me`, so tests can interleave
/// operations deterministically.
#[derive(Default)]
struct FakeApi {
    me_calls: AtomicUsize,
    login_calls: AtomicUsize,
    register_calls: AtomicUsize,
    slow_entered: Notify,
    release: Notify,
    me_entered: Notify,
    release_me: Notify,
}

#[async_trait::async_trait]
impl AuthApi for FakeApi {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        match (email, password) {
            ("slow@x.com", _) => {
                self.slow_entered.notify_one();
                self.release.notified().await;
                Ok(AuthResponse {
                    token: "T-slow".into(),
                    user: UserProfile { id: "9".into(), name: "Slow".into(), email: email.into() },
                })
            }
            ("a@x.com", "right") => Ok(AuthResponse { token: "T1".into(), user: ann() }),
            (_, "offline") => Err(AuthError::Network("connection refused".into())),
            _ => Err(AuthError::Rejected { status: 401, message: "Invalid credentials".into() }),
        }
    }

    async fn register(&self, name: &str, email: &str, _password: &str) -> Result<AuthResponse, AuthError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        if email == "taken@x.com" {
            return Err(AuthError::Rejected { status: 400, message: "User already exists".into() });
        }
        Ok(AuthResponse { token: "T2".into(), user: UserProfile { id: "2".into(), name: name.into(), email: email.into() } })
    }

    async fn me(&self, token: &str) -> Result<UserProfile, AuthError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        match token {
            "T1" => Ok(ann()),
            "offline" => Err(AuthError::Network("timed out".into())),
            "parked" => {
                self.me_entered.notify_one();
                self.release_me.notified().await;
                Err(AuthError::TokenInvalid)
            }
            _ => Err(AuthError::TokenInvalid),
        }
    }

    async fn send(
        &self,
        _method: Method,
        path: &str,
        token: Option<&str>,
        _body: Option<&Value>,
    ) -> Result<Value, AuthError> {
        match (path, token) {
            ("/capsules", Some("T1")) => Ok(serde_json::json!([{ "id": "c1" }])),
            ("/capsules", _) => Err(AuthError::Rejected { status: 401, message: "Token is not valid".into() }),
            _ => Err(AuthError::Rejected { status: 404, message: "Not found".into() }),
        }
    }
}

fn manager_with(store: MemoryTokenStore) -> (Arc<SessionManager>, Arc<FakeApi>, Arc<MemoryTokenStore>) {
    let api = Arc::new(FakeApi::default());
    let store = Arc::new(store);
    let manager = Arc::new(SessionManager::new(api.clone(), store.clone(), KEY));
    (manager, api, store)
}

fn persisted(store: &MemoryTokenStore) -> Option<String> {
    store.get(KEY).unwrap()
}

// =============================================================
// initialize
// =============================================================

#[tokio::test]
async fn starts_initializing_and_loading() {
    let (manager, _, _) = manager_with(MemoryTokenStore::new());
    assert_eq!(manager.phase(), AuthPhase::Initializing);
    assert!(manager.snapshot().is_loading);
    assert!(!manager.is_initialized());
}

#[tokio::test]
async fn initialize_without_token_skips_network() {
    let (manager, api, _) = manager_with(MemoryTokenStore::new());
    let session = manager.initialize().await;

    assert_eq!(session, Session::anonymous());
    assert!(!session.is_loading);
    assert_eq!(api.me_calls.load(Ordering::SeqCst), 0);
    assert_eq!(manager.phase(), AuthPhase::Anonymous);
}

#[tokio::test]
async fn initialize_with_valid_token_restores_user() {
    let (manager, _, store) = manager_with(MemoryTokenStore::with_entry(KEY, "T1"));
    let session = manager.initialize().await;

    assert!(session.is_authenticated);
    assert_eq!(session.user.as_ref().map(|u| u.name.as_str()), Some("Ann"));
    assert_eq!(session.token.as_deref(), Some("T1"));
    assert_eq!(persisted(&store).as_deref(), Some("T1"));
    assert_eq!(manager.phase(), AuthPhase::Authenticated);
}

#[tokio::test]
async fn initialize_with_rejected_token_clears_it_silently() {
    let (manager, _, store) = manager_with(MemoryTokenStore::with_entry(KEY, "stale"));
    let session = manager.initialize().await;

    assert_eq!(session, Session::anonymous());
    assert!(session.last_error.is_none());
    assert_eq!(persisted(&store), None);
}

#[tokio::test]
async fn initialize_network_failure_downgrades_to_anonymous() {
    let (manager, _, store) = manager_with(MemoryTokenStore::with_entry(KEY, "offline"));
    let session = manager.initialize().await;

    assert!(!session.is_authenticated);
    assert!(!session.is_loading);
    assert!(session.last_error.is_none());
    assert_eq!(persisted(&store), None);
}

#[tokio::test]
async fn initialize_runs_once() {
    let (manager, api, _) = manager_with(MemoryTokenStore::with_entry(KEY, "T1"));
    let (a, b) = tokio::join!(manager.initialize(), manager.initialize());
    let c = manager.initialize().await;

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(api.me_calls.load(Ordering::SeqCst), 1);
    assert!(manager.is_initialized());
}

#[tokio::test]
async fn initialize_resets_unreadable_store() {
    let path = std::env::temp_dir().join(format!("capsule-manager-{}", uuid::Uuid::new_v4())).join("session.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json").unwrap();

    let api = Arc::new(FakeApi::default());
    let store = Arc::new(crate::store::FileTokenStore::new(&path));
    let manager = SessionManager::new(api.clone(), store.clone(), KEY);

    assert_eq!(manager.initialize().await, Session::anonymous());
    assert_eq!(api.me_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.get(KEY).unwrap(), None);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[tokio::test]
async fn route_access_is_pending_until_initialized() {
    let (manager, _, _) = manager_with(MemoryTokenStore::with_entry(KEY, "T1"));
    assert_eq!(manager.route_access(), RouteAccess::Pending);

    manager.initialize().await;
    assert_eq!(manager.route_access(), RouteAccess::Allow);

    manager.logout();
    assert_eq!(manager.route_access(), RouteAccess::RedirectToLogin);
}

// =============================================================
// login / register
// =============================================================

#[tokio::test]
async fn login_success_authenticates_and_persists() {
    let (manager, _, store) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    let user = manager.login("a@x.com", "right").await.unwrap();
    assert_eq!(user, ann());

    let session = manager.snapshot();
    assert!(session.is_authenticated);
    assert_eq!(session.user, Some(ann()));
    assert_eq!(persisted(&store).as_deref(), Some("T1"));
    assert_eq!(manager.phase(), AuthPhase::Authenticated);
}

#[tokio::test]
async fn login_rejected_reports_message_and_keeps_store() {
    let (manager, _, store) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    let err = manager.login("a@x.com", "wrong").await.unwrap_err();
    assert_eq!(err.user_message(), "Invalid credentials");

    let session = manager.snapshot();
    assert!(!session.is_authenticated);
    assert!(!session.is_loading);
    assert_eq!(session.last_error.as_deref(), Some("Invalid credentials"));
    assert_eq!(persisted(&store), None);
}

#[tokio::test]
async fn login_network_failure_uses_generic_message() {
    let (manager, _, _) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    let err = manager.login("a@x.com", "offline").await.unwrap_err();
    assert!(matches!(err, AuthError::Network(_)));
    assert_eq!(manager.snapshot().last_error.as_deref(), Some(crate::error::NETWORK_FAILED_MESSAGE));
}

#[tokio::test]
async fn login_is_forwarded_without_validation() {
    let (manager, api, _) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    assert!(manager.login("", "").await.is_err());
    assert_eq!(api.login_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn previous_error_does_not_block_next_login() {
    let (manager, _, _) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    manager.login("a@x.com", "wrong").await.unwrap_err();
    manager.login("a@x.com", "right").await.unwrap();

    let session = manager.snapshot();
    assert!(session.is_authenticated);
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn failed_login_keeps_existing_token() {
    let (manager, _, store) = manager_with(MemoryTokenStore::with_entry(KEY, "T1"));
    manager.initialize().await;

    manager.login("a@x.com", "wrong").await.unwrap_err();
    assert_eq!(persisted(&store).as_deref(), Some("T1"));
    assert!(manager.snapshot().is_authenticated);
}

#[tokio::test]
async fn register_success_authenticates_and_persists() {
    let (manager, _, store) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    let user = manager.register("Bob", "b@x.com", "secret1").await.unwrap();
    assert_eq!(user, bob());
    assert_eq!(manager.phase(), AuthPhase::Authenticated);
    assert_eq!(persisted(&store).as_deref(), Some("T2"));
}

#[tokio::test]
async fn register_rejected_sets_last_error() {
    let (manager, _, store) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    let err = manager.register("Bob", "taken@x.com", "secret1").await.unwrap_err();
    assert_eq!(err.user_message(), "User already exists");
    assert_eq!(manager.snapshot().last_error.as_deref(), Some("User already exists"));
    assert_eq!(persisted(&store), None);
}

#[tokio::test]
async fn clear_error_drops_message() {
    let (manager, _, _) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;
    manager.login("a@x.com", "wrong").await.unwrap_err();

    manager.clear_error();
    assert!(manager.snapshot().last_error.is_none());
}

// =============================================================
// logout
// =============================================================

#[tokio::test]
async fn logout_from_authenticated_clears_everything() {
    let (manager, _, store) = manager_with(MemoryTokenStore::with_entry(KEY, "T1"));
    manager.initialize().await;

    manager.logout();
    assert_eq!(manager.snapshot(), Session::anonymous());
    assert_eq!(persisted(&store), None);
    assert_eq!(manager.phase(), AuthPhase::Anonymous);
}

#[tokio::test]
async fn logout_when_anonymous_is_harmless() {
    let (manager, _, store) = manager_with(MemoryTokenStore::new());
    manager.logout();
    manager.logout();
    assert_eq!(manager.snapshot(), Session::anonymous());
    assert_eq!(persisted(&store), None);
}

// =============================================================
// Ordering
// =============================================================

#[tokio::test]
async fn login_during_verification_waits_for_it() {
    let (manager, api, store) = manager_with(MemoryTokenStore::with_entry(KEY, "parked"));

    let init = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.initialize().await })
    };
    api.me_entered.notified().await;

    let login = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login("a@x.com", "wrong").await })
    };
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    assert!(!manager.is_initialized());
    assert_eq!(manager.route_access(), RouteAccess::Pending);
    assert_eq!(api.login_calls.load(Ordering::SeqCst), 0);

    api.release_me.notify_one();
    init.await.unwrap();
    let err = login.await.unwrap().unwrap_err();

    assert_eq!(err.user_message(), "Invalid credentials");
    assert_eq!(api.login_calls.load(Ordering::SeqCst), 1);
    assert_eq!(persisted(&store), None);
    assert_eq!(manager.phase(), AuthPhase::Anonymous);
    assert_eq!(manager.route_access(), RouteAccess::RedirectToLogin);
}

#[tokio::test]
async fn register_during_verification_lands_after_it() {
    let (manager, api, store) = manager_with(MemoryTokenStore::with_entry(KEY, "parked"));

    let init = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.initialize().await })
    };
    api.me_entered.notified().await;

    let register = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.register("Bob", "b@x.com", "secret1").await })
    };
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(api.register_calls.load(Ordering::SeqCst), 0);

    api.release_me.notify_one();
    init.await.unwrap();
    assert_eq!(register.await.unwrap().unwrap(), bob());

    assert_eq!(persisted(&store).as_deref(), Some("T2"));
    assert_eq!(manager.phase(), AuthPhase::Authenticated);
}

#[tokio::test]
async fn login_before_initialize_runs_verification_first() {
    let (manager, api, store) = manager_with(MemoryTokenStore::with_entry(KEY, "stale"));

    manager.login("a@x.com", "right").await.unwrap();

    assert!(manager.is_initialized());
    assert_eq!(api.me_calls.load(Ordering::SeqCst), 1);
    assert_eq!(persisted(&store).as_deref(), Some("T1"));
    assert!(manager.snapshot().is_authenticated);

    manager.initialize().await;
    assert_eq!(api.me_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn superseded_login_does_not_overwrite_newer_result() {
    let (manager, api, store) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    let slow = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login("slow@x.com", "right").await })
    };
    api.slow_entered.notified().await;

    manager.login("a@x.com", "right").await.unwrap();
    api.release.notify_one();

    let stale = slow.await.unwrap();
    assert!(matches!(stale, Err(AuthError::Superseded)));
    assert_eq!(manager.snapshot().user, Some(ann()));
    assert_eq!(persisted(&store).as_deref(), Some("T1"));
}

#[tokio::test]
async fn logout_wins_over_in_flight_login() {
    let (manager, api, store) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;

    let slow = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login("slow@x.com", "right").await })
    };
    api.slow_entered.notified().await;
    assert!(manager.snapshot().is_loading);

    manager.logout();
    api.release.notify_one();

    assert!(matches!(slow.await.unwrap(), Err(AuthError::Superseded)));
    assert_eq!(manager.snapshot(), Session::anonymous());
    assert_eq!(persisted(&store), None);
}

#[tokio::test]
async fn subscribers_see_login_transition() {
    let (manager, _, _) = manager_with(MemoryTokenStore::new());
    manager.initialize().await;
    let mut rx = manager.subscribe();

    manager.login("a@x.com", "right").await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_authenticated);
}

// =============================================================
// authorized_request
// =============================================================

#[tokio::test]
async fn authorized_request_attaches_session_token() {
    let (manager, _, _) = manager_with(MemoryTokenStore::with_entry(KEY, "T1"));
    manager.initialize().await;

    let body = manager.authorized_request(Method::GET, "/capsules", None).await.unwrap();
    assert_eq!(body[0]["id"], "c1");
    assert!(manager.snapshot().is_authenticated);
}

#[tokio::test]
async fn unauthorized_response_signs_out() {
    let (manager, _, store) = manager_with(MemoryTokenStore::with_entry(KEY, "T1"));
    manager.initialize().await;
    // Token revoked server-side after startup.
    manager.state.send_modify(|session| session.token = Some("revoked".into()));

    let err = manager.authorized_request(Method::GET, "/capsules", None).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(manager.snapshot(), Session::anonymous());
    assert_eq!(persisted(&store), None);
}

#[tokio::test]
async fn non_auth_failure_keeps_session() {
    let (manager, _, _) = manager_with(MemoryTokenStore::with_entry(KEY, "T1"));
    manager.initialize().await;

    let err = manager.authorized_request(Method::GET, "/missing", None).await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected { status: 404, .. }));
    assert!(manager.snapshot().is_authenticated);
}
