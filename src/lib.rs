//! A client for the product-admin REST API.
//!
//! Everything that talks to the API goes through a [`SessionManager`], which
//! owns the bearer token and the logged in [`User`], persists them to a
//! [`SessionStorage`], and logs the user out whenever the server answers with
//! `401 Unauthorized`.

#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

mod config;
pub mod endpoints;
mod manager;
mod product;
mod request;
mod session;
mod storage;
#[cfg(test)]
mod test_support;
mod user;

pub use config::{
    Config, ConfigError, Environment, API_URL_VAR, ENVIRONMENT_VAR,
};
pub use manager::SessionManager;
pub use product::{NewProduct, Product};
pub use request::{ApiResponse, RequestError, RequestOptions, SessionTransition};
pub use session::{Credentials, Session};
pub use storage::{
    FileStorage, MemoryStorage, SessionStorage, StorageError, TOKEN_KEY,
    USER_KEY,
};
pub use user::{User, UserId};

/// The default user agent to use when communicating with the API.
pub const DEFAULT_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));
