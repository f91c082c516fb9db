//! Product records and the queued-mutation contract
//!
//! Wire field names follow the backend (`nome`, `marca`, `valor`); the Rust
//! side uses `name`, `brand` and `price`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pagination::PageQuery;

pub type ProductId = i64;

/// Resource record as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "marca")]
    pub brand: String,
    #[serde(rename = "valor")]
    pub price: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Client-side payload rejection, mirroring the backend's validation codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("product name is required")]
    NameRequired,

    #[error("product brand is required")]
    BrandRequired,

    #[error("product price must be numeric")]
    PriceNotNumeric,

    #[error("product price must be greater than zero")]
    PriceNotPositive,
}

impl PayloadError {
    /// Backend error code for the same rejection
    pub fn code(&self) -> &'static str {
        match self {
            Self::NameRequired => "nome_is_required",
            Self::BrandRequired => "marca_is_required",
            Self::PriceNotNumeric => "valor_must_be_numeric",
            Self::PriceNotPositive => "valor_must_be_greater_than_zero",
        }
    }
}

/// Create/update body. Construct through [`ProductPayload::normalized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPayload {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "marca")]
    pub brand: String,
    #[serde(rename = "valor")]
    pub price: f64,
}

impl ProductPayload {
    /// Trim both strings, require them non-empty, require a finite positive
    /// price and round it to cents.
    pub fn normalized(name: &str, brand: &str, price: f64) -> Result<Self, PayloadError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PayloadError::NameRequired);
        }

        let brand = brand.trim();
        if brand.is_empty() {
            return Err(PayloadError::BrandRequired);
        }

        if !price.is_finite() {
            return Err(PayloadError::PriceNotNumeric);
        }
        let price = round_to_cents(price);
        if price <= 0.0 {
            return Err(PayloadError::PriceNotPositive);
        }

        Ok(Self {
            name: name.to_string(),
            brand: brand.to_string(),
            price,
        })
    }

    /// Re-run normalization on an already built payload
    pub fn renormalized(&self) -> Result<Self, PayloadError> {
        Self::normalized(&self.name, &self.brand, self.price)
    }
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One page of the collection plus the full collection size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    pub items: Vec<Product>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl ListResponse {
    pub fn empty(query: PageQuery) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            offset: query.offset,
            limit: query.limit,
        }
    }

    pub fn query(&self) -> PageQuery {
        PageQuery::new(self.offset, self.limit)
    }

    pub fn find(&self, id: ProductId) -> Option<&Product> {
        self.items.iter().find(|product| product.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Queued,
}

/// Immediate acknowledgement of a queued mutation. Carries no final state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub status: AckStatus,
    pub operation: OperationKind,
    pub operation_id: String,
    #[serde(rename = "product_id", default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<ProductId>,
}

/// Mutation submitted by the page controller
#[derive(Debug, Clone, PartialEq)]
pub enum MutationRequest {
    Create(ProductPayload),
    Update { id: ProductId, payload: ProductPayload },
    Delete { id: ProductId },
}

impl MutationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn target_id(&self) -> Option<ProductId> {
        match self {
            Self::Create(_) => None,
            Self::Update { id, .. } | Self::Delete { id } => Some(*id),
        }
    }

    pub fn payload(&self) -> Option<&ProductPayload> {
        match self {
            Self::Create(payload) | Self::Update { payload, .. } => Some(payload),
            Self::Delete { .. } => None,
        }
    }

    /// Same request with its payload renormalized
    pub fn normalized(&self) -> Result<Self, PayloadError> {
        Ok(match self {
            Self::Create(payload) => Self::Create(payload.renormalized()?),
            Self::Update { id, payload } => Self::Update {
                id: *id,
                payload: payload.renormalized()?,
            },
            Self::Delete { id } => Self::Delete { id: *id },
        })
    }
}
