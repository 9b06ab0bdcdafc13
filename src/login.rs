#[cfg(feature = "web")]
use crate::app::{AppState, escape_html};
use crate::config::ConfigError;
use crate::pipeline::BatchOutcome;
#[cfg(feature = "web")]
use axum::{
    Form, Json,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Default session lifetime (24 hours in seconds)
pub const SESSION_DURATION: u64 = 24 * 60 * 60;

// Upper bound for configured lifetimes, keeps the chrono arithmetic in range.
const MAX_SESSION_DURATION: u64 = 365 * 24 * 60 * 60;

/// A stored credential: username plus the SHA-256 hex digest of the password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Lowercase hex SHA-256 of the user's password
    pub password_hash: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }
}

/// Credential data for login
///
/// Used to receive the login form data from the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Username for login
    #[serde(default)]
    pub username: String,

    /// Password in plaintext (only transmitted, never stored)
    #[serde(default)]
    pub password: String,
}

/// Authentication failures surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Please fill in both username and password")]
    MissingCredentials,

    #[error("Invalid username or password")]
    InvalidCredentials,
}

/// Read-only table of known users
///
/// Built once from configuration and shared between gates behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    hashes: HashMap<String, String>,
}

impl CredentialStore {
    /// Build the store, validating that every hash is a 64 character hex digest
    ///
    /// # Errors
    /// * `ConfigError::InvalidPasswordHash` for a malformed digest
    /// * `ConfigError::DuplicateUser` when a username appears twice
    pub fn new<I>(credentials: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = Credential>,
    {
        let mut hashes = HashMap::new();

        for credential in credentials {
            let hash = credential.password_hash.trim().to_lowercase();
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::InvalidPasswordHash {
                    username: credential.username,
                });
            }
            if hashes.contains_key(&credential.username) {
                return Err(ConfigError::DuplicateUser(credential.username));
            }
            hashes.insert(credential.username, hash);
        }

        Ok(Self { hashes })
    }

    pub fn contains(&self, username: &str) -> bool {
        self.hashes.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn hash_for(&self, username: &str) -> Option<&str> {
        self.hashes.get(username).map(String::as_str)
    }
}

/// Hash a password with SHA-256
///
/// # Returns
/// * `String` - Lowercase hex digest (64 characters)
///
/// # Examples
/// ```
/// use sentiment_portal::login::hash_password;
///
/// assert_eq!(
///     hash_password("admin"),
///     "8c6976e5b5410415bde908bd4dee15dfb167a9c873fc4bb8a81f6f2ab448a918"
/// );
/// ```
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Compare two byte strings without short-circuiting on the first mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// User session data
///
/// Represents an authenticated user session. The token is a random UUID
/// held server side; it carries no information about the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Username of the authenticated user
    pub username: String,

    /// Opaque session identifier
    pub auth_token: String,

    /// Time the session was opened
    pub created_at: DateTime<Utc>,

    /// Time when the session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Login state machine for one user context
///
/// Starts unauthenticated. A successful [`AuthGate::login`] moves it to
/// authenticated; [`AuthGate::logout`] or expiry moves it back.
#[derive(Debug, Clone)]
pub struct AuthGate {
    store: Arc<CredentialStore>,
    session_ttl: Duration,
    session: Option<Session>,
}

impl AuthGate {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self {
            store,
            session_ttl: Duration::seconds(SESSION_DURATION as i64),
            session: None,
        }
    }

    /// Set the session lifetime in seconds
    pub fn with_session_ttl(mut self, seconds: u64) -> Self {
        self.session_ttl = Duration::seconds(seconds.min(MAX_SESSION_DURATION) as i64);
        self
    }

    /// Verify credentials and open a session
    ///
    /// The password is hashed and compared in constant time against the
    /// stored digest. A failed attempt leaves the current state untouched.
    ///
    /// # Errors
    /// * `AuthError::MissingCredentials` if either field is empty
    /// * `AuthError::InvalidCredentials` for an unknown user or wrong password
    pub fn login(&mut self, username: &str, password: &str) -> Result<Session, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let supplied = hash_password(password);
        let matches = self
            .store
            .hash_for(username)
            .is_some_and(|stored| constant_time_eq(stored.as_bytes(), supplied.as_bytes()));

        if !matches {
            log::warn!("Rejected login attempt for user '{}'", username);
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let session = Session {
            username: username.to_string(),
            auth_token: Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        log::info!("User '{}' logged in", username);
        self.session = Some(session.clone());

        Ok(session)
    }

    /// Close the session. Calling it again is a no-op.
    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            log::info!("User '{}' logged out", session.username);
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    pub fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.is_expired_at(now))
    }

    /// Username of the authenticated user, if any
    pub fn current_user(&self) -> Option<&str> {
        if self.is_authenticated() {
            self.session.as_ref().map(|s| s.username.as_str())
        } else {
            None
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

/// Everything the server keeps for one logged-in browser
#[derive(Debug)]
pub struct UserContext {
    pub gate: AuthGate,
    pub last_outcome: Option<Arc<BatchOutcome>>,
}

/// Active sessions keyed by their token
///
/// Each entry owns its [`AuthGate`]; expired entries are dropped on lookup.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    contexts: RwLock<HashMap<String, UserContext>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated gate
    ///
    /// # Returns
    /// * `Option<String>` - The session token, or None if the gate is not authenticated
    pub fn insert(&self, gate: AuthGate) -> Option<String> {
        let token = gate
            .session()
            .filter(|_| gate.is_authenticated())?
            .auth_token
            .clone();

        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        contexts.insert(
            token.clone(),
            UserContext {
                gate,
                last_outcome: None,
            },
        );

        Some(token)
    }

    /// Validate a session token
    ///
    /// # Returns
    /// * `Option<String>` - The username for the session if valid, None otherwise
    pub fn authenticated_user(&self, token: &str) -> Option<String> {
        {
            let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
            match contexts.get(token) {
                None => return None,
                Some(context) => {
                    if let Some(user) = context.gate.current_user() {
                        return Some(user.to_string());
                    }
                }
            }
        }

        // Present but expired
        self.end(token);
        None
    }

    /// Log the session out and forget it
    ///
    /// # Returns
    /// * `bool` - Whether a session was removed
    pub fn end(&self, token: &str) -> bool {
        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        match contexts.remove(token) {
            Some(mut context) => {
                context.gate.logout();
                true
            }
            None => false,
        }
    }

    /// Remember the latest batch analysis for a session
    pub fn store_outcome(&self, token: &str, outcome: Arc<BatchOutcome>) -> bool {
        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        match contexts.get_mut(token) {
            Some(context) => {
                context.last_outcome = Some(outcome);
                true
            }
            None => false,
        }
    }

    pub fn last_outcome(&self, token: &str) -> Option<Arc<BatchOutcome>> {
        let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
        contexts.get(token).and_then(|c| c.last_outcome.clone())
    }

    /// Drop every expired session
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        let before = contexts.len();
        contexts.retain(|_, context| context.gate.is_authenticated_at(now));
        before - contexts.len()
    }

    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity attached to requests that passed [`require_auth`]
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub token: String,
    pub username: String,
}

/// Query parameters accepted by the login page
#[cfg(feature = "web")]
#[derive(Debug, Default, Deserialize)]
pub struct LoginPageQuery {
    pub error: Option<String>,
    pub logged_out: Option<bool>,
}

// Web handler functions below (only compiled with "web" feature)

/// Serve the login page HTML
///
/// An `error` query parameter is shown above the form.
#[cfg(feature = "web")]
pub async fn serve_login_page(Query(query): Query<LoginPageQuery>) -> Html<String> {
    let message = match (query.error, query.logged_out) {
        (Some(error), _) => format!("<p class=\"error\">{}</p>", escape_html(&error)),
        (None, Some(true)) => "<p class=\"info\">You have been logged out.</p>".to_string(),
        _ => String::new(),
    };

    Html(include_str!("./static/login.html").replace("<!-- message -->", &message))
}

/// Handle user login requests
///
/// Validates the form credentials with a fresh [`AuthGate`], registers the
/// session and sets the session cookie.
///
/// # Returns
/// * `Response` - Redirect to the analysis page if successful, back to the login page if not
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    let mut gate = state.new_gate();

    if let Err(e) = gate.login(credentials.username.trim(), &credentials.password) {
        let target = format!("/login?error={}", urlencoding::encode(&e.to_string()));
        return Redirect::to(&target).into_response();
    }

    // A browser logging in again replaces its previous session
    if let Some(previous) = jar.get(SESSION_COOKIE) {
        state.sessions.end(previous.value());
    }

    match state.sessions.insert(gate) {
        Some(token) => {
            let cookie = Cookie::build((SESSION_COOKIE, token))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax);
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Session could not be created").into_response(),
    }
}

/// Handle user logout
///
/// Ends the server side session, clears the cookie and redirects to the login page.
#[cfg(feature = "web")]
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.end(cookie.value());
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login?logged_out=true"),
    )
}

/// Authentication middleware
///
/// Lets requests with a valid session through and attaches a
/// [`CurrentSession`]. API calls without one get 401, pages are
/// redirected to the login form.
#[cfg(feature = "web")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(username) = state.sessions.authenticated_user(cookie.value()) {
            request.extensions_mut().insert(CurrentSession {
                token: cookie.value().to_string(),
                username,
            });
            return next.run(request).await;
        }
    }

    if request.uri().path().starts_with("/api/") {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "status": "error",
                "message": "Authentication required",
            })),
        )
            .into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<CredentialStore> {
        Arc::new(
            CredentialStore::new([
                Credential::new("admin", hash_password("admin")),
                Credential::new("usuario", hash_password("1234")),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn hash_matches_known_digests() {
        assert_eq!(
            hash_password("1234"),
            "03ac674216f3e15c761ee1a5e255f067953623c8b388b4459e13f978d7c846f4"
        );
        assert_eq!(hash_password("admin").len(), 64);
    }

    #[test]
    fn constant_time_eq_compares_bytes() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn login_with_valid_credentials_authenticates() {
        let mut gate = AuthGate::new(store());
        let session = gate.login("admin", "admin").unwrap();

        assert!(gate.is_authenticated());
        assert_eq!(gate.current_user(), Some("admin"));
        assert_eq!(session.username, "admin");
        assert!(session.expires_at > session.created_at);
    }

    #[test]
    fn every_stored_user_can_log_in() {
        for (user, password) in [("admin", "admin"), ("usuario", "1234")] {
            let mut gate = AuthGate::new(store());
            assert!(gate.login(user, password).is_ok());
            assert!(gate.is_authenticated());
        }
    }

    #[test]
    fn wrong_password_is_rejected() {
        let mut gate = AuthGate::new(store());
        assert_eq!(gate.login("admin", "wrong"), Err(AuthError::InvalidCredentials));
        assert!(!gate.is_authenticated());
        assert_eq!(gate.current_user(), None);
    }

    #[test]
    fn unknown_user_is_rejected() {
        let mut gate = AuthGate::new(store());
        assert_eq!(gate.login("ghost", "admin"), Err(AuthError::InvalidCredentials));
        assert!(!gate.is_authenticated());
    }

    #[test]
    fn empty_fields_are_missing_credentials() {
        let mut gate = AuthGate::new(store());
        assert_eq!(gate.login("", "admin"), Err(AuthError::MissingCredentials));
        assert_eq!(gate.login("admin", ""), Err(AuthError::MissingCredentials));
        assert!(!gate.is_authenticated());
    }

    #[test]
    fn failed_login_keeps_existing_session() {
        let mut gate = AuthGate::new(store());
        gate.login("admin", "admin").unwrap();
        assert!(gate.login("admin", "wrong").is_err());
        assert_eq!(gate.current_user(), Some("admin"));
    }

    #[test]
    fn logout_is_idempotent() {
        let mut gate = AuthGate::new(store());
        gate.login("admin", "admin").unwrap();

        gate.logout();
        assert!(!gate.is_authenticated());
        assert!(gate.session().is_none());

        gate.logout();
        assert!(!gate.is_authenticated());
        assert!(gate.session().is_none());
        assert_eq!(gate.current_user(), None);
    }

    #[test]
    fn tokens_are_unique_per_login() {
        let mut first = AuthGate::new(store());
        let mut second = AuthGate::new(store());
        let a = first.login("admin", "admin").unwrap();
        let b = second.login("admin", "admin").unwrap();
        assert_ne!(a.auth_token, b.auth_token);
    }

    #[test]
    fn session_expires_after_ttl() {
        let mut gate = AuthGate::new(store()).with_session_ttl(60);
        let session = gate.login("admin", "admin").unwrap();

        assert!(gate.is_authenticated_at(session.created_at));
        assert!(!gate.is_authenticated_at(session.expires_at));
        assert!(!gate.is_authenticated_at(session.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn store_rejects_malformed_hashes() {
        let result = CredentialStore::new([Credential::new("admin", "not-a-hash")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidPasswordHash { username }) if username == "admin"
        ));
    }

    #[test]
    fn store_rejects_duplicate_users() {
        let hash = hash_password("x");
        let result = CredentialStore::new([
            Credential::new("admin", hash.clone()),
            Credential::new("admin", hash),
        ]);
        assert!(matches!(result, Err(ConfigError::DuplicateUser(name)) if name == "admin"));
    }

    #[test]
    fn store_accepts_uppercase_hex() {
        let store = CredentialStore::new([Credential::new(
            "admin",
            hash_password("admin").to_uppercase(),
        )])
        .unwrap();
        let mut gate = AuthGate::new(Arc::new(store));
        assert!(gate.login("admin", "admin").is_ok());
    }

    #[test]
    fn registry_tracks_sessions() {
        let registry = SessionRegistry::new();
        let mut gate = AuthGate::new(store());
        gate.login("usuario", "1234").unwrap();

        let token = registry.insert(gate).unwrap();
        assert_eq!(registry.authenticated_user(&token), Some("usuario".to_string()));
        assert_eq!(registry.authenticated_user("unknown"), None);

        assert!(registry.end(&token));
        assert!(!registry.end(&token));
        assert_eq!(registry.authenticated_user(&token), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_refuses_unauthenticated_gates() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.insert(AuthGate::new(store())), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_drops_expired_sessions() {
        let registry = SessionRegistry::new();
        let mut expired = AuthGate::new(store()).with_session_ttl(0);
        expired.login("admin", "admin").unwrap();
        let token = expired.session().unwrap().auth_token.clone();

        // An already expired gate is not accepted
        assert_eq!(registry.insert(expired), None);

        let mut live = AuthGate::new(store());
        live.login("admin", "admin").unwrap();
        let live_token = registry.insert(live).unwrap();

        assert_eq!(registry.purge_expired(), 0);
        assert_eq!(registry.authenticated_user(&token), None);
        assert_eq!(registry.authenticated_user(&live_token), Some("admin".to_string()));
    }
}
