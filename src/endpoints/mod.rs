//! The API's endpoints.

mod login;
mod products;
mod register;

pub use login::{login, LoginError};
pub use products::{
    create_product, delete_product, get_product, list_products,
    update_product, ProductError,
};
pub use register::{register, RegisterError, Registration};

use crate::ApiResponse;
use reqwest::StatusCode;
use serde_derive::Deserialize;

pub(crate) const LOGIN_PATH: &str = "auth/login";
pub(crate) const REGISTER_PATH: &str = "auth/register";
pub(crate) const PRODUCTS_PATH: &str = "products";

/// Pull the status code and a human readable message out of an unsuccessful
/// response.
async fn rejection(response: ApiResponse) -> (StatusCode, Option<String>) {
    let status = response.status();

    match response.text().await {
        Ok(body) => {
            log::trace!("Response: {}", body);
            (status, error_message(&body))
        },
        Err(e) => {
            log::debug!("Unable to read the error response: {}", e);
            (status, None)
        },
    }
}

/// The server explains most failures with a `message` or `error` field.
fn error_message(body: &str) -> Option<String> {
    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;

    parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.trim().is_empty())
}
