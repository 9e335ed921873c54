use crate::{user::RawId, Config, Credentials, User, UserId};
use reqwest::{Client, Error as ReqwestError, StatusCode};
use serde_derive::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};

/// Exchange an email and password for a bearer token and the user it
/// belongs to.
///
/// This only talks to the server. Use [`crate::SessionManager::login()`] to
/// actually start a session.
pub async fn login(
    client: &Client,
    config: &Config,
    email: &str,
    password: &str,
) -> Result<Credentials, LoginError> {
    let url = config.resolve_url(super::LOGIN_PATH)?;
    let data = Data { email, password };

    log::debug!("Sending a login request to {}", url);
    log::trace!("Payload: {:#?}", data);
    let response = client.post(url).json(&data).send().await?;

    log::trace!("Headers: {:#?}", response.headers());
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(LoginError::RejectedByServer {
            status,
            message: super::error_message(&body),
        });
    }

    parse_login_response(&body)
}

/// Figure out which of the known response shapes `body` is and normalize it.
fn parse_login_response(body: &str) -> Result<Credentials, LoginError> {
    let raw: RawLoginResponse = serde_json::from_str(body)?;
    let shape = LoginShape::classify(raw).ok_or(LoginError::MalformedResponse)?;
    log::trace!("Login response shape: {}", shape.describe());

    Ok(shape.normalize())
}

#[derive(Copy, Clone, Serialize)]
struct Data<'a> {
    email: &'a str,
    password: &'a str,
}

impl Debug for Data<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// Everything we know how to look at in a login response.
#[derive(Debug, Default, Deserialize)]
struct RawLoginResponse {
    token: Option<String>,
    #[serde(rename = "accessToken")]
    access_token_camel: Option<String>,
    access_token: Option<String>,
    user: Option<RawIdentity>,
    #[serde(flatten)]
    top_level: RawIdentity,
}

#[derive(Debug, Default, Deserialize)]
struct RawIdentity {
    #[serde(rename = "_id")]
    object_id: Option<RawId>,
    id: Option<RawId>,
    #[serde(rename = "fullName")]
    full_name: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

/// The login response shapes we understand.
///
/// Both shapes need an id and an email for the user. The email is the one
/// piece of identity every part of the client relies on (it is the display
/// name of last resort and what gets logged), so a response without one is
/// treated as a failed login rather than producing a nameless user.
#[derive(Debug, Clone, PartialEq)]
enum LoginShape {
    /// `{ "token": ..., "user": { "_id": ..., "email": ... } }`
    Nested { token: String, identity: Identity },
    /// `{ "token": ..., "_id": ..., "email": ... }`
    TopLevel { token: String, identity: Identity },
}

impl LoginShape {
    fn classify(raw: RawLoginResponse) -> Option<LoginShape> {
        let RawLoginResponse {
            token,
            access_token_camel,
            access_token,
            user,
            top_level,
        } = raw;

        let token = non_empty(token)
            .or_else(|| non_empty(access_token_camel))
            .or_else(|| non_empty(access_token))?;

        if let Some(identity) = user.and_then(Identity::from_raw) {
            return Some(LoginShape::Nested { token, identity });
        }

        Identity::from_raw(top_level)
            .map(|identity| LoginShape::TopLevel { token, identity })
    }

    fn describe(&self) -> &'static str {
        match self {
            LoginShape::Nested { .. } => "nested user",
            LoginShape::TopLevel { .. } => "top-level user",
        }
    }

    fn normalize(self) -> Credentials {
        let (token, identity) = match self {
            LoginShape::Nested { token, identity } => (token, identity),
            LoginShape::TopLevel { token, identity } => (token, identity),
        };

        let Identity {
            id,
            email,
            full_name,
            name,
        } = identity;
        let display_name = full_name.or(name).unwrap_or_else(|| email.clone());

        Credentials {
            token,
            user: User {
                id: UserId::from(id),
                display_name,
                email,
            },
        }
    }
}

/// A user identity with everything we need present.
#[derive(Debug, Clone, PartialEq)]
struct Identity {
    id: String,
    email: String,
    full_name: Option<String>,
    name: Option<String>,
}

impl Identity {
    fn from_raw(raw: RawIdentity) -> Option<Identity> {
        let id = raw
            .object_id
            .or(raw.id)
            .map(RawId::into_string)
            .filter(|id| !id.is_empty())?;
        let email = non_empty(raw.email)?;

        Some(Identity {
            id,
            email,
            full_name: non_empty(raw.full_name),
            name: non_empty(raw.name),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Possible errors that may be returned by [`login()`].
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Unable to determine the login URL")]
    InvalidUrl(#[from] url::ParseError),
    /// The HTTP client encountered an error.
    #[error("Unable to send the login request")]
    HttpClient(#[from] ReqwestError),
    /// The server didn't accept the credentials.
    #[error("Login was rejected by the server ({})", status)]
    RejectedByServer {
        status: StatusCode,
        message: Option<String>,
    },
    /// Unable to parse the login response.
    #[error("Unable to parse the login response")]
    ResponseParse(#[from] serde_json::Error),
    /// The login succeeded but the response was missing a token or the
    /// user's identity.
    #[error("The login response didn't contain a token and user")]
    MalformedResponse,
}
