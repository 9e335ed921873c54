//! A stub API server and some fixtures for the tests.

use crate::{Config, MemoryStorage, User, UserId, TOKEN_KEY, USER_KEY};
use axum::{
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::{any, post},
    Json, Router,
};
use serde_json::{json, Map, Value};

pub(crate) const EMAIL: &str = "a@b.com";
pub(crate) const PASSWORD: &str = "hunter2";

pub(crate) fn user() -> User {
    User {
        id: UserId::from("u1"),
        display_name: String::from("Ada"),
        email: String::from(EMAIL),
    }
}

/// Storage containing a session for [`user()`].
pub(crate) fn authenticated_storage(token: &str) -> MemoryStorage {
    let user = serde_json::to_string(&user()).unwrap();

    MemoryStorage::with_values(vec![
        (TOKEN_KEY, token.to_string()),
        (USER_KEY, user),
    ])
}

/// A well-formed login response.
pub(crate) fn login_body() -> Value {
    json!({
        "token": "t1",
        "user": { "_id": "u1", "email": EMAIL, "fullName": "Ada" },
    })
}

/// Configuration pointing at a port nobody is listening on.
pub(crate) fn unreachable_config() -> Config {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    Config::new(&format!("http://{}/api", address)).unwrap()
}

/// Serve `router` on a random local port, returning a [`Config`] whose base
/// URL is the server's `/api`.
pub(crate) async fn spawn(router: Router) -> Config {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Config::new(&format!("http://{}/api", address)).unwrap()
}

/// The bits of the API the session tests care about.
///
/// Logging in as [`EMAIL`]/[`PASSWORD`] returns `login_response`, any other
/// credentials get a `400`. `/api/expired` always answers `401`,
/// `/api/forbidden` `403` and `/api/broken` `500`. Everything else echoes
/// the request back.
pub(crate) fn api(login_response: Value) -> Router {
    let login = move |Json(body): Json<Value>| {
        let login_response = login_response.clone();

        async move {
            if body["email"] == EMAIL && body["password"] == PASSWORD {
                (StatusCode::OK, Json(login_response))
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "message": "Invalid credentials" })),
                )
            }
        }
    };

    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/expired", any(|| async { StatusCode::UNAUTHORIZED }))
        .route("/api/forbidden", any(|| async { StatusCode::FORBIDDEN }))
        .route(
            "/api/broken",
            any(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .fallback(echo)
}

/// Describe the request we received as JSON.
pub(crate) async fn echo(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    let headers: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or_default();
            (name.as_str().to_string(), Value::from(value))
        })
        .collect();

    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "headers": headers,
        "body": body,
    }))
}
