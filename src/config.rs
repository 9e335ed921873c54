use std::{env, str::FromStr};
use url::Url;

/// The environment variable used to pick between [`Environment`]s.
pub const ENVIRONMENT_VAR: &str = "PRODUCT_ADMIN_ENV";
/// The environment variable used to override the API's base URL.
pub const API_URL_VAR: &str = "PRODUCT_ADMIN_API_URL";

/// Which deployment we are talking to when no base URL is given explicitly.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// The base URL used when nothing overrides it.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Environment::Production => "https://api.product-admin.app/api",
            Environment::Development => "http://localhost:5000/api",
        }
    }
}

impl Default for Environment {
    fn default() -> Environment {
        if cfg!(debug_assertions) {
            Environment::Development
        } else {
            Environment::Production
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Environment, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Settings resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    base_url: Url,
}

impl Config {
    /// Use `base_url` as-is.
    pub fn new(base_url: &str) -> Result<Config, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ConfigError::InvalidBaseUrl {
                url: base_url.to_string(),
                source: e,
            }
        })?;

        if base_url.cannot_be_a_base() {
            return Err(ConfigError::NotABase(base_url.to_string()));
        }
        // request paths are appended to the base, so it must end in a path
        if base_url.query().is_some() || base_url.fragment().is_some() {
            return Err(ConfigError::QueryOrFragment(base_url.to_string()));
        }

        Ok(Config { base_url })
    }

    /// Pick the base URL for `environment`, letting an externally supplied
    /// value take precedence.
    pub fn resolve(
        environment: Environment,
        override_url: Option<&str>,
    ) -> Result<Config, ConfigError> {
        match override_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => Config::new(url),
            None => Config::new(environment.default_base_url()),
        }
    }

    /// Resolve the configuration from [`ENVIRONMENT_VAR`] and
    /// [`API_URL_VAR`].
    pub fn from_env() -> Result<Config, ConfigError> {
        let environment = match env::var(ENVIRONMENT_VAR) {
            Ok(value) => value.parse()?,
            Err(_) => Environment::default(),
        };
        let override_url = env::var(API_URL_VAR).ok();

        log::debug!(
            "Resolving the API configuration for {:?} (override: {:?})",
            environment,
            override_url
        );

        Config::resolve(environment, override_url.as_deref())
    }

    pub fn base_url(&self) -> &Url { &self.base_url }

    /// Turn a request path into an absolute URL.
    ///
    /// Absolute `http`/`https` URLs are passed through untouched, everything
    /// else is appended to the base URL so `"/products"` and `"products"`
    /// point at the same place.
    pub fn resolve_url(&self, path: &str) -> Result<Url, url::ParseError> {
        if let Ok(url) = Url::parse(path) {
            if url.scheme() == "http" || url.scheme() == "https" {
                return Ok(url);
            }
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');

        Url::parse(&format!("{}/{}", base, path))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("\"{}\" is not a valid base URL", url)]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("\"{0}\" can't be used as a base URL")]
    NotABase(String),
    #[error("The base URL \"{0}\" can't have a query string or fragment")]
    QueryOrFragment(String),
    #[error("Unknown environment \"{0}\", expected \"production\" or \"development\"")]
    UnknownEnvironment(String),
}
