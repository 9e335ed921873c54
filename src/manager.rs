use crate::{
    endpoints::{self, LoginError},
    request::merge_headers,
    ApiResponse, Config, Credentials, RequestError, RequestOptions, Session,
    SessionStorage, SessionTransition, StorageError, User, TOKEN_KEY,
    USER_KEY,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, StatusCode,
};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Owns the current [`Session`] and sends every authenticated request to the
/// API.
///
/// The session is restored from storage when the manager is created, saved
/// whenever someone logs in, and wiped on [`SessionManager::logout()`] or as
/// soon as any request comes back with `401 Unauthorized`.
pub struct SessionManager {
    client: Client,
    config: Config,
    storage: Box<dyn SessionStorage>,
    session: RwLock<Session>,
}

impl SessionManager {
    /// Create a new manager, picking up any session left in `storage` by a
    /// previous run.
    pub fn new<S>(client: Client, config: Config, storage: S) -> SessionManager
    where
        S: SessionStorage + 'static,
    {
        let session = restore(&storage);

        SessionManager {
            client,
            config,
            storage: Box::new(storage),
            session: RwLock::new(session),
        }
    }

    pub fn config(&self) -> &Config { &self.config }

    pub fn client(&self) -> &Client { &self.client }

    /// A snapshot of the current session.
    pub fn session(&self) -> Session { self.read().clone() }

    pub fn is_authenticated(&self) -> bool { self.read().is_authenticated() }

    pub fn token(&self) -> Option<String> {
        self.read().token().map(String::from)
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().current_user().cloned()
    }

    /// Log in, returning whether it worked.
    ///
    /// Failures are logged and leave the current session untouched. Use
    /// [`SessionManager::try_login()`] to find out why a login failed.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        match self.try_login(email, password).await {
            Ok(_) => true,
            Err(e) => {
                log::error!("Login failed: {}", e);
                false
            },
        }
    }

    /// Log in and start a new session, replacing the current one.
    pub async fn try_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, LoginError> {
        let credentials =
            endpoints::login(&self.client, &self.config, email, password)
                .await?;
        let user = credentials.user.clone();

        if let Err(e) = self.persist(&credentials) {
            log::warn!("Unable to save the session: {}", e);
        }
        self.write().set(credentials);

        log::info!("Logged in as {}", user.email);
        Ok(user)
    }

    /// Forget the current session. Logging out twice is fine.
    pub fn logout(&self) {
        if let Some(previous) = self.write().clear() {
            log::info!("Logged out {}", previous.user.email);
        }

        self.discard_persisted();
    }

    /// Send a request to the API.
    ///
    /// `path` is resolved against the configured base URL (absolute URLs are
    /// used as-is) and the request carries `Content-Type: application/json`
    /// plus the bearer token, if we have one. Headers in `options` win over
    /// both.
    ///
    /// If the server responds with `401 Unauthorized` the session is cleared
    /// before the response is returned, and [`ApiResponse::transition()`]
    /// says so. Every other status leaves the session alone.
    pub async fn request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, RequestError> {
        let url = self.config.resolve_url(path).map_err(|e| {
            RequestError::InvalidUrl {
                path: path.to_string(),
                source: e,
            }
        })?;
        let (method, extra_headers, body) = options.into_parts();
        let headers = merge_headers(self.default_headers()?, &extra_headers)?;

        log::debug!("Sending a {} request to {}", method, url);
        log::trace!("Header names: {:?}", headers.keys().collect::<Vec<_>>());

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        log::trace!("Response Headers: {:#?}", response.headers());

        let transition = if response.status() == StatusCode::UNAUTHORIZED {
            log::warn!(
                "{} was rejected as unauthorized, ending the session",
                response.url()
            );
            self.logout();
            SessionTransition::LoggedOut
        } else {
            SessionTransition::Unchanged
        };

        Ok(ApiResponse::new(response, transition))
    }

    fn default_headers(&self) -> Result<HeaderMap, RequestError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = self.token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| {
                    RequestError::InvalidHeader(AUTHORIZATION.to_string())
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    /// Save the credentials so the next run can pick them up.
    fn persist(&self, credentials: &Credentials) -> Result<(), StorageError> {
        let user = serde_json::to_string(&credentials.user)?;

        let result = self
            .storage
            .set(TOKEN_KEY, &credentials.token)
            .and_then(|_| self.storage.set(USER_KEY, &user));

        if result.is_err() {
            // don't leave half a session lying around
            self.discard_persisted();
        }

        result
    }

    fn discard_persisted(&self) { discard(self.storage.as_ref()) }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let session = self.read();

        f.debug_struct("SessionManager")
            .field("base_url", &self.config.base_url().as_str())
            .field("authenticated", &session.is_authenticated())
            .field("user", &session.current_user())
            .finish()
    }
}

/// Load a previously saved session, throwing away anything which doesn't
/// make sense.
fn restore(storage: &dyn SessionStorage) -> Session {
    match read_persisted(storage) {
        Ok(Some(credentials)) => {
            log::info!("Restored the session for {}", credentials.user.email);
            Session::authenticated(credentials)
        },
        Ok(None) => Session::empty(),
        Err(e) => {
            log::warn!("Discarding the saved session: {}", e);
            discard(storage);
            Session::empty()
        },
    }
}

fn read_persisted(
    storage: &dyn SessionStorage,
) -> Result<Option<Credentials>, RestoreError> {
    let token = storage.get(TOKEN_KEY)?;
    let user = storage.get(USER_KEY)?;

    let (token, user) = match (token, user) {
        (None, None) => return Ok(None),
        (Some(token), Some(user)) => (token, user),
        _ => return Err(RestoreError::Incomplete),
    };

    let user: User = serde_json::from_str(&user)?;

    Credentials::new(token, user)
        .map(Some)
        .ok_or(RestoreError::EmptyToken)
}

fn discard(storage: &dyn SessionStorage) {
    for key in &[TOKEN_KEY, USER_KEY] {
        if let Err(e) = storage.remove(key) {
            log::warn!("Unable to remove \"{}\" from storage: {}", key, e);
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RestoreError {
    #[error("Unable to read the saved session")]
    Storage(#[from] StorageError),
    #[error("Only one of the token and user were saved")]
    Incomplete,
    #[error("The saved user is invalid")]
    BadUser(#[from] serde_json::Error),
    #[error("The saved token is empty")]
    EmptyToken,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_support::{self, EMAIL, PASSWORD},
        MemoryStorage, UserId,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn stored(storage: &MemoryStorage) -> (Option<String>, Option<String>) {
        (
            storage.get(TOKEN_KEY).unwrap(),
            storage.get(USER_KEY).unwrap(),
        )
    }

    /// Storage whose writes to one key always fail.
    struct BrokenKey {
        inner: MemoryStorage,
        broken: &'static str,
    }

    impl SessionStorage for BrokenKey {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == self.broken {
                Err(StorageError::InvalidKey(key.to_string()))
            } else {
                self.inner.set(key, value)
            }
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    async fn echoed(manager: &SessionManager, path: &str, options: RequestOptions) -> Value {
        let response = manager.request(path, options).await.unwrap();
        assert_eq!(response.transition(), SessionTransition::Unchanged);
        response.json().await.unwrap()
    }

    #[test]
    fn restore_a_saved_session() {
        let storage = test_support::authenticated_storage("t1");

        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            storage,
        );

        assert!(manager.is_authenticated());
        assert_eq!(manager.token().as_deref(), Some("t1"));
        assert_eq!(manager.current_user(), Some(test_support::user()));
    }

    #[test]
    fn restoring_leaves_valid_storage_alone() {
        let storage = Arc::new(test_support::authenticated_storage("t1"));

        let _manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            Arc::clone(&storage),
        );

        let (token, user) = stored(&storage);
        assert_eq!(token.as_deref(), Some("t1"));
        assert!(user.is_some());
    }

    #[test]
    fn nothing_saved_means_nobody_is_logged_in() {
        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            MemoryStorage::new(),
        );

        assert!(!manager.is_authenticated());
        assert_eq!(manager.session(), Session::empty());
    }

    #[test]
    fn corrupt_user_records_are_discarded() {
        let storage = Arc::new(MemoryStorage::with_values(vec![
            (TOKEN_KEY, "t1"),
            (USER_KEY, "{not json"),
        ]));

        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            Arc::clone(&storage),
        );

        assert!(!manager.is_authenticated());
        assert_eq!(stored(&storage), (None, None));
    }

    #[test]
    fn user_records_with_missing_fields_are_discarded() {
        let storage = Arc::new(MemoryStorage::with_values(vec![
            (TOKEN_KEY, "t1"),
            (USER_KEY, r#"{"id": "u1"}"#),
        ]));

        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            Arc::clone(&storage),
        );

        assert!(!manager.is_authenticated());
        assert_eq!(stored(&storage), (None, None));
    }

    #[test]
    fn a_token_without_a_user_is_discarded() {
        let storage =
            Arc::new(MemoryStorage::with_values(vec![(TOKEN_KEY, "t1")]));

        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            Arc::clone(&storage),
        );

        assert!(!manager.is_authenticated());
        assert_eq!(stored(&storage), (None, None));
    }

    #[test]
    fn an_empty_token_is_discarded() {
        let user = serde_json::to_string(&test_support::user()).unwrap();
        let storage = Arc::new(MemoryStorage::with_values(vec![
            (TOKEN_KEY, String::new()),
            (USER_KEY, user),
        ]));

        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            Arc::clone(&storage),
        );

        assert!(!manager.is_authenticated());
        assert_eq!(stored(&storage), (None, None));
    }

    #[test]
    fn logout_is_idempotent() {
        let storage = Arc::new(test_support::authenticated_storage("t1"));
        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            Arc::clone(&storage),
        );

        manager.logout();
        let after_first = manager.session();
        manager.logout();

        assert_eq!(manager.session(), after_first);
        assert!(!manager.is_authenticated());
        assert_eq!(stored(&storage), (None, None));
    }

    #[tokio::test]
    async fn login_starts_a_session_and_the_token_is_sent_afterwards() {
        let config = test_support::spawn(test_support::api(json!({
            "token": "t1",
            "user": { "_id": "u1", "email": "a@b.com" },
        })))
        .await;
        let storage = Arc::new(MemoryStorage::new());
        let manager =
            SessionManager::new(Client::new(), config, Arc::clone(&storage));

        assert!(manager.login(EMAIL, PASSWORD).await);

        assert!(manager.is_authenticated());
        let user = manager.current_user().unwrap();
        assert_eq!(user.id, UserId::from("u1"));
        assert_eq!(user.display_name, "a@b.com");

        let echo = echoed(&manager, "products", RequestOptions::get()).await;
        assert_eq!(echo["headers"]["authorization"], "Bearer t1");

        let (token, saved_user) = stored(&storage);
        assert_eq!(token.as_deref(), Some("t1"));
        let saved_user: User = serde_json::from_str(&saved_user.unwrap()).unwrap();
        assert_eq!(saved_user, user);
    }

    #[tokio::test]
    async fn login_still_succeeds_when_the_session_cant_be_saved() {
        let config = test_support::spawn(test_support::api(json!({
            "token": "t1",
            "user": { "_id": "u1", "email": "a@b.com" },
        })))
        .await;
        let storage = Arc::new(BrokenKey {
            inner: MemoryStorage::new(),
            broken: USER_KEY,
        });
        let manager =
            SessionManager::new(Client::new(), config, Arc::clone(&storage));

        assert!(manager.login(EMAIL, PASSWORD).await);

        assert!(manager.is_authenticated());
        assert_eq!(manager.token().as_deref(), Some("t1"));
        assert_eq!(manager.current_user().unwrap().id, UserId::from("u1"));
        // the token was written first, but mustn't outlive the failed user
        assert_eq!(stored(&storage.inner), (None, None));
    }

    #[tokio::test]
    async fn a_saved_login_survives_a_restart() {
        let config = test_support::spawn(test_support::api(json!({
            "token": "t1",
            "user": { "_id": "u1", "email": "a@b.com", "fullName": "Ada" },
        })))
        .await;
        let storage = Arc::new(MemoryStorage::new());
        let first = SessionManager::new(
            Client::new(),
            config.clone(),
            Arc::clone(&storage),
        );
        assert!(first.login(EMAIL, PASSWORD).await);

        let second = SessionManager::new(Client::new(), config, storage);

        assert_eq!(second.session(), first.session());
    }

    #[tokio::test]
    async fn login_without_a_token_fails_and_keeps_the_old_session() {
        let config = test_support::spawn(test_support::api(json!({
            "user": { "_id": "u2", "email": "other@b.com" },
        })))
        .await;
        let storage = Arc::new(test_support::authenticated_storage("t0"));
        let manager =
            SessionManager::new(Client::new(), config, Arc::clone(&storage));
        let before = manager.session();

        assert!(!manager.login(EMAIL, PASSWORD).await);

        assert_eq!(manager.session(), before);
        assert_eq!(stored(&storage).0.as_deref(), Some("t0"));
    }

    #[tokio::test]
    async fn login_with_bad_credentials_fails() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager =
            SessionManager::new(Client::new(), config, MemoryStorage::new());

        let got = manager.try_login(EMAIL, "wrong").await;

        match got {
            Err(LoginError::RejectedByServer { status, message }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message.as_deref(), Some("Invalid credentials"));
            },
            other => panic!("Unexpected result: {:?}", other),
        }
        assert!(!manager.login(EMAIL, "wrong").await);
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn login_fails_when_the_server_is_unreachable() {
        let storage = Arc::new(test_support::authenticated_storage("t0"));
        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            Arc::clone(&storage),
        );

        assert!(!manager.login(EMAIL, PASSWORD).await);
        assert_eq!(manager.token().as_deref(), Some("t0"));
    }

    #[tokio::test]
    async fn unauthorized_responses_end_the_session() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let storage = Arc::new(test_support::authenticated_storage("t1"));
        let manager =
            SessionManager::new(Client::new(), config, Arc::clone(&storage));

        let response =
            manager.request("expired", RequestOptions::get()).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.transition(), SessionTransition::LoggedOut);
        assert!(!manager.is_authenticated());
        assert_eq!(stored(&storage), (None, None));
    }

    #[tokio::test]
    async fn other_failures_leave_the_session_alone() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager = SessionManager::new(
            Client::new(),
            config,
            test_support::authenticated_storage("t1"),
        );

        for path in &["forbidden", "broken"] {
            let response =
                manager.request(path, RequestOptions::get()).await.unwrap();

            assert!(!response.is_success());
            assert_eq!(response.transition(), SessionTransition::Unchanged);
        }
        assert!(manager.is_authenticated());
    }

    #[tokio::test]
    async fn concurrent_unauthorized_responses_both_log_out() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager = SessionManager::new(
            Client::new(),
            config,
            test_support::authenticated_storage("t1"),
        );

        let (first, second) = tokio::join!(
            manager.request("expired", RequestOptions::get()),
            manager.request("expired", RequestOptions::post()),
        );

        assert_eq!(first.unwrap().transition(), SessionTransition::LoggedOut);
        assert_eq!(second.unwrap().transition(), SessionTransition::LoggedOut);
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn anonymous_requests_have_no_authorization_header() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager =
            SessionManager::new(Client::new(), config, MemoryStorage::new());

        let echo = echoed(&manager, "products", RequestOptions::get()).await;

        assert_eq!(echo["headers"]["authorization"], Value::Null);
        assert_eq!(echo["headers"]["content-type"], "application/json");
    }

    #[tokio::test]
    async fn caller_headers_are_merged_with_the_defaults() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager = SessionManager::new(
            Client::new(),
            config,
            test_support::authenticated_storage("t1"),
        );

        let echo = echoed(
            &manager,
            "products",
            RequestOptions::get().header("X-Custom", "1"),
        )
        .await;

        assert_eq!(echo["headers"]["authorization"], "Bearer t1");
        assert_eq!(echo["headers"]["x-custom"], "1");
        assert_eq!(echo["headers"]["content-type"], "application/json");
    }

    #[tokio::test]
    async fn caller_headers_override_the_defaults() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager = SessionManager::new(
            Client::new(),
            config,
            test_support::authenticated_storage("t1"),
        );

        let echo = echoed(
            &manager,
            "products",
            RequestOptions::get()
                .header("Content-Type", "text/plain")
                .header("Authorization", "Bearer other"),
        )
        .await;

        assert_eq!(echo["headers"]["content-type"], "text/plain");
        assert_eq!(echo["headers"]["authorization"], "Bearer other");
    }

    #[tokio::test]
    async fn relative_paths_resolve_against_the_base_url() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager =
            SessionManager::new(Client::new(), config, MemoryStorage::new());

        let with_slash =
            echoed(&manager, "/products", RequestOptions::get()).await;
        let without_slash =
            echoed(&manager, "products", RequestOptions::get()).await;

        assert_eq!(with_slash["path"], "/api/products");
        assert_eq!(with_slash["path"], without_slash["path"]);
    }

    #[tokio::test]
    async fn absolute_urls_are_used_as_is() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let other =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager = SessionManager::new(
            Client::new(),
            config,
            test_support::authenticated_storage("t1"),
        );
        let url = other.resolve_url("/x").unwrap();
        assert_eq!(url.path(), "/api/x");
        let absolute = format!(
            "http://{}:{}/elsewhere",
            url.host_str().unwrap(),
            url.port().unwrap()
        );

        let echo = echoed(&manager, &absolute, RequestOptions::get()).await;

        assert_eq!(echo["path"], "/elsewhere");
    }

    #[tokio::test]
    async fn request_bodies_and_methods_are_forwarded() {
        let config =
            test_support::spawn(test_support::api(test_support::login_body()))
                .await;
        let manager =
            SessionManager::new(Client::new(), config, MemoryStorage::new());

        let echo = echoed(
            &manager,
            "products",
            RequestOptions::put().json(&json!({ "name": "Lamp" })).unwrap(),
        )
        .await;

        assert_eq!(echo["method"], "PUT");
        assert_eq!(echo["body"], r#"{"name":"Lamp"}"#);
    }

    #[tokio::test]
    async fn transport_failures_are_returned_to_the_caller() {
        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            test_support::authenticated_storage("t1"),
        );

        let got = manager.request("products", RequestOptions::get()).await;

        assert!(matches!(got, Err(RequestError::Transport(_))));
        assert!(manager.is_authenticated());
    }

    #[test]
    fn debug_output_hides_the_token() {
        let manager = SessionManager::new(
            Client::new(),
            test_support::unreachable_config(),
            test_support::authenticated_storage("super-secret-token"),
        );

        let got = format!("{:?}", manager);

        assert!(got.contains("authenticated: true"));
        assert!(!got.contains("super-secret-token"));
    }
}
