use crate::{RequestError, RequestOptions, SessionManager};
use reqwest::StatusCode;
use serde_derive::Serialize;
use std::fmt::{self, Debug, Formatter};

/// Create a new account.
///
/// This doesn't log the new user in; call [`SessionManager::login()`]
/// afterwards for that.
pub async fn register(
    manager: &SessionManager,
    registration: &Registration<'_>,
) -> Result<(), RegisterError> {
    log::trace!("Payload: {:#?}", registration);
    let options = RequestOptions::post().json(registration)?;
    let response = manager.request(super::REGISTER_PATH, options).await?;

    if response.is_success() {
        log::info!("Registered {}", registration.email);
        return Ok(());
    }

    let (status, message) = super::rejection(response).await;
    Err(RegisterError::RejectedByServer { status, message })
}

/// The details needed to sign up.
#[derive(Copy, Clone, Serialize)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

impl Debug for Registration<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// Possible errors that may be returned by [`register()`].
#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("Unable to send the registration request")]
    Request(#[from] RequestError),
    /// The server refused to create the account (e.g. because the email is
    /// already taken).
    #[error("Registration was rejected by the server ({})", status)]
    RejectedByServer {
        status: StatusCode,
        message: Option<String>,
    },
}
