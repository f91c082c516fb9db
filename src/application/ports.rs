//! Collaborator interfaces consumed by the reconciliation engine
//!
//! Transport, session storage and presentation live behind these traits so any
//! concrete implementation (reqwest client, file store, console output) can be
//! swapped without touching the controller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::error_classifier::ApiError;
use crate::domain::{ListResponse, PageQuery, ProductId, ProductPayload, QueuedOperation};

/// List query and mutation endpoints of the products backend
#[async_trait]
pub trait ProductsApi: Send + Sync {
    async fn list_products(&self, query: PageQuery) -> Result<ListResponse, ApiError>;

    async fn create_product(&self, payload: &ProductPayload) -> Result<QueuedOperation, ApiError>;

    async fn update_product(
        &self,
        id: ProductId,
        payload: &ProductPayload,
    ) -> Result<QueuedOperation, ApiError>;

    async fn delete_product(&self, id: ProductId) -> Result<QueuedOperation, ApiError>;
}

/// Local key-value storage for the access token
pub trait SessionStore: Send + Sync {
    fn token(&self) -> Option<String>;

    fn store(&self, token: &str) -> anyhow::Result<()>;

    fn clear(&self);

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// One user-visible message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Redirect to the login surface, carrying where to come back to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRedirect {
    pub route: String,
    pub return_path: String,
}

pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, redirect: &LoginRedirect);
}
