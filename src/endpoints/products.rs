use crate::{
    ApiResponse, NewProduct, Product, RequestError, RequestOptions,
    SessionManager, SessionTransition,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;

/// Fetch every product.
pub async fn list_products(
    manager: &SessionManager,
) -> Result<Vec<Product>, ProductError> {
    let response = manager
        .request(super::PRODUCTS_PATH, RequestOptions::get())
        .await?;

    match decode(response).await? {
        ProductList::Bare(products) => Ok(products),
        ProductList::Wrapped { products } => Ok(products),
    }
}

/// Fetch a single product.
pub async fn get_product(
    manager: &SessionManager,
    id: &str,
) -> Result<Product, ProductError> {
    let response = manager
        .request(&product_path(id)?, RequestOptions::get())
        .await?;

    decode::<Single>(response).await.map(Single::into_inner)
}

/// Add a new product, returning it as the server stored it.
pub async fn create_product(
    manager: &SessionManager,
    product: &NewProduct,
) -> Result<Product, ProductError> {
    log::debug!("Creating \"{}\"", product.name);
    let options = RequestOptions::post().json(product)?;
    let response = manager.request(super::PRODUCTS_PATH, options).await?;

    decode::<Single>(response).await.map(Single::into_inner)
}

/// Replace a product's details.
pub async fn update_product(
    manager: &SessionManager,
    id: &str,
    product: &NewProduct,
) -> Result<Product, ProductError> {
    log::debug!("Updating {}", id);
    let options = RequestOptions::put().json(product)?;
    let response = manager.request(&product_path(id)?, options).await?;

    decode::<Single>(response).await.map(Single::into_inner)
}

/// Remove a product.
pub async fn delete_product(
    manager: &SessionManager,
    id: &str,
) -> Result<(), ProductError> {
    log::debug!("Deleting {}", id);
    let response = manager
        .request(&product_path(id)?, RequestOptions::delete())
        .await?;

    check(response).await.map(|_| ())
}

fn product_path(id: &str) -> Result<String, ProductError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(format!("{}/{}", super::PRODUCTS_PATH, id))
    } else {
        Err(ProductError::InvalidId(id.to_string()))
    }
}

/// Turn unauthorized and unsuccessful responses into errors.
async fn check(response: ApiResponse) -> Result<ApiResponse, ProductError> {
    if response.transition() == SessionTransition::LoggedOut {
        return Err(ProductError::Unauthorized);
    }

    if !response.is_success() {
        let (status, message) = super::rejection(response).await;
        return Err(ProductError::RejectedByServer { status, message });
    }

    Ok(response)
}

async fn decode<T: DeserializeOwned>(
    response: ApiResponse,
) -> Result<T, ProductError> {
    let body = check(response)
        .await?
        .text()
        .await
        .map_err(RequestError::Transport)?;
    log::trace!("Response: {}", body);

    serde_json::from_str(&body).map_err(ProductError::Decode)
}

/// Product lists come back either bare or wrapped in an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProductList {
    Bare(Vec<Product>),
    Wrapped { products: Vec<Product> },
}

/// The same goes for single products.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Single {
    Wrapped { product: Product },
    Bare(Product),
}

impl Single {
    fn into_inner(self) -> Product {
        match self {
            Single::Wrapped { product } => product,
            Single::Bare(product) => product,
        }
    }
}

/// Possible errors when working with products.
#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error("Unable to send the request")]
    Request(#[from] RequestError),
    /// The session expired (or never existed) and has been cleared.
    #[error("You need to log in again")]
    Unauthorized,
    #[error("The request was rejected by the server ({})", status)]
    RejectedByServer {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("Unable to parse the response")]
    Decode(#[source] serde_json::Error),
    #[error("\"{0}\" is not a valid product id")]
    InvalidId(String),
}
