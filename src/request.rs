use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, Response, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Serialize};

/// Everything about an API call except where it is going.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl RequestOptions {
    pub fn new(method: Method) -> RequestOptions {
        RequestOptions {
            method,
            ..Default::default()
        }
    }

    pub fn get() -> RequestOptions { RequestOptions::new(Method::GET) }

    pub fn post() -> RequestOptions { RequestOptions::new(Method::POST) }

    pub fn put() -> RequestOptions { RequestOptions::new(Method::PUT) }

    pub fn delete() -> RequestOptions { RequestOptions::new(Method::DELETE) }

    /// Add a header. Headers added here win over the ones the
    /// [`crate::SessionManager`] adds by default.
    pub fn header<K, V>(mut self, name: K, value: V) -> RequestOptions
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Use `body` as the request's JSON payload.
    pub fn json<T>(mut self, body: &T) -> Result<RequestOptions, RequestError>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(body).map_err(RequestError::Encode)?;
        self.body = Some(body);
        Ok(self)
    }

    pub fn method(&self) -> &Method { &self.method }

    pub fn body(&self) -> Option<&[u8]> { self.body.as_deref() }

    pub(crate) fn into_parts(self) -> (Method, Vec<(String, String)>, Option<Vec<u8>>) {
        (self.method, self.headers, self.body)
    }
}

/// Merge the caller's headers over `defaults`, replacing any default which
/// shares a name with a caller header.
pub(crate) fn merge_headers(
    mut defaults: HeaderMap,
    extra: &[(String, String)],
) -> Result<HeaderMap, RequestError> {
    let mut overrides = HeaderMap::new();

    for (name, value) in extra {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RequestError::InvalidHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| RequestError::InvalidHeader(name.clone()))?;
        overrides.append(header_name, header_value);
    }

    // extending replaces every value stored under a matching name
    defaults.extend(overrides);

    Ok(defaults)
}

/// How a request changed the session, if at all.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    Unchanged,
    /// The server said `401 Unauthorized`, so the session was cleared before
    /// the response was handed back.
    LoggedOut,
}

/// The server's response, plus whatever it did to the session.
#[derive(Debug)]
pub struct ApiResponse {
    response: Response,
    transition: SessionTransition,
}

impl ApiResponse {
    pub(crate) fn new(
        response: Response,
        transition: SessionTransition,
    ) -> ApiResponse {
        ApiResponse {
            response,
            transition,
        }
    }

    pub fn status(&self) -> StatusCode { self.response.status() }

    pub fn is_success(&self) -> bool { self.status().is_success() }

    pub fn transition(&self) -> SessionTransition { self.transition }

    pub fn headers(&self) -> &HeaderMap { self.response.headers() }

    pub fn url(&self) -> &Url { self.response.url() }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, reqwest::Error> {
        self.response.json().await
    }

    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }

    pub fn into_inner(self) -> Response { self.response }
}

/// Errors that may be returned by [`crate::SessionManager::request()`].
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Unable to turn \"{}\" into a URL", path)]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("\"{0}\" is not a valid header")]
    InvalidHeader(String),
    #[error("Unable to serialize the request body")]
    Encode(#[source] serde_json::Error),
    /// The HTTP client encountered an error.
    #[error("Unable to send the request")]
    Transport(#[from] reqwest::Error),
}
