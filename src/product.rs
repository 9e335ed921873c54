use crate::user::RawId;
use serde_derive::{Deserialize, Serialize};
use std::convert::TryFrom;

/// A product as the API reports it.
///
/// The id may arrive as `_id`, `id`, or both (`_id` wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProduct")]
#[non_exhaustive]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    /// How many are in stock.
    #[serde(default)]
    pub stock: u32,
}

#[derive(Debug, Deserialize)]
struct RawProduct {
    #[serde(rename = "_id")]
    object_id: Option<RawId>,
    id: Option<RawId>,
    name: String,
    #[serde(default)]
    description: String,
    price: f64,
    #[serde(default)]
    category: String,
    #[serde(default)]
    stock: u32,
}

impl TryFrom<RawProduct> for Product {
    type Error = &'static str;

    fn try_from(raw: RawProduct) -> Result<Product, Self::Error> {
        let RawProduct {
            object_id,
            id,
            name,
            description,
            price,
            category,
            stock,
        } = raw;

        let id = object_id
            .or(id)
            .map(RawId::into_string)
            .filter(|id| !id.is_empty())
            .ok_or("the product has no id")?;

        Ok(Product {
            id,
            name,
            description,
            price,
            category,
            stock,
        })
    }
}

/// The editable parts of a [`Product`], used when creating or updating one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub stock: u32,
}

impl NewProduct {
    pub fn new<S: Into<String>>(name: S, price: f64) -> NewProduct {
        NewProduct {
            name: name.into(),
            description: String::new(),
            price,
            category: String::new(),
            stock: 0,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category<S: Into<String>>(mut self, category: S) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock = stock;
        self
    }
}

impl From<Product> for NewProduct {
    fn from(product: Product) -> NewProduct {
        NewProduct {
            name: product.name,
            description: product.description,
            price: product.price,
            category: product.category,
            stock: product.stock,
        }
    }
}
