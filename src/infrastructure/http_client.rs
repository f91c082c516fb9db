//! HTTP client for the products backend
//!
//! Implements [`ProductsApi`] over reqwest plus the auth endpoints.
//! Every `api/` request carries `Authorization: Bearer <token>` when the
//! session store holds one. Non-success answers are turned into
//! [`ApiError::Http`] with the `"error"` field of the JSON body as code.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Client, Method, RequestBuilder, Response,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::application::error_classifier::ApiError;
use crate::application::ports::{ProductsApi, SessionStore};
use crate::domain::{ListResponse, PageQuery, Product, ProductId, ProductPayload, QueuedOperation};
use crate::infrastructure::config::ApiConfig;

pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

const PRODUCTS_PATH: &str = "api/products";
const LOGIN_PATH: &str = "api/auth/login";
const LOGOUT_PATH: &str = "api/auth/logout";
const REGISTER_PATH: &str = "api/auth/register";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Total from the `X-Total-Count` header, or `fallback` when the header is
/// absent, unparsable or negative.
pub fn parse_total_count(header: Option<&str>, fallback: usize) -> u64 {
    header
        .and_then(|value| value.trim().parse::<i64>().ok())
        .and_then(|total| u64::try_from(total).ok())
        .unwrap_or(fallback as u64)
}

/// `"error"` field of a JSON error body, if any
pub fn error_code(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}

fn map_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else if error.is_decode() {
        ApiError::Decode(error.to_string())
    } else {
        ApiError::Transport(error.to_string())
    }
}

pub struct ProductsHttpClient {
    client: Client,
    base_url: Url,
    session_store: Arc<dyn SessionStore>,
}

impl ProductsHttpClient {
    pub fn new(config: &ApiConfig, session_store: Arc<dyn SessionStore>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        let mut base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid base URL: {}", config.base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            session_store,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid endpoint '{path}': {e}")))
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(path)?;
        let mut request = self.client.request(method, url);
        if path.starts_with("api/") {
            if let Some(token) = self.session_store.token() {
                request = request.bearer_auth(token);
            }
        }
        Ok(request)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let code = error_code(&body);
        debug!("Backend answered {} with code {:?}", status, code);
        Err(ApiError::Http {
            status: status.as_u16(),
            code,
        })
    }

    async fn send_mutation(&self, request: RequestBuilder) -> Result<QueuedOperation, ApiError> {
        let response = self.send(request).await?;
        let ack: QueuedOperation = response.json().await.map_err(map_transport_error)?;
        debug!("📨 {} accepted as {}", ack.operation, ack.operation_id);
        Ok(ack)
    }

    fn product_path(id: ProductId) -> String {
        format!("{PRODUCTS_PATH}/{id}")
    }

    /// Exchange credentials for a token and persist it.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginResponse> {
        let request = self.request(Method::POST, LOGIN_PATH)?.json(&LoginRequest {
            identifier: identifier.trim(),
            password,
        });
        let response = self.send(request).await.context("Login rejected")?;
        let login: LoginResponse = response
            .json()
            .await
            .map_err(map_transport_error)
            .context("Unexpected login response")?;

        self.session_store.store(&login.access_token)?;
        info!("🔑 Signed in, token valid for {:?}s", login.expires_in);
        Ok(login)
    }

    fn register_request(&self, name: &str, email: &str, password: &str) -> Result<RequestBuilder, ApiError> {
        Ok(self.request(Method::POST, REGISTER_PATH)?.json(&RegisterRequest {
            name: name.trim(),
            email: email.trim(),
            password,
        }))
    }

    /// Create an account. The returned token is not stored: the user signs in
    /// explicitly afterwards.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<LoginResponse> {
        let request = self.register_request(name, email, password)?;
        let response = self.send(request).await.context("Registration rejected")?;
        let registered: LoginResponse = response
            .json()
            .await
            .map_err(map_transport_error)
            .context("Unexpected registration response")?;

        info!("🆕 Account created for {}", email.trim());
        Ok(registered)
    }

    /// Best-effort server logout; the local token is cleared regardless.
    /// Returns `false` when there was no session to end.
    pub async fn logout(&self) -> bool {
        if !self.session_store.is_authenticated() {
            return false;
        }

        let result = match self.request(Method::POST, LOGOUT_PATH) {
            Ok(request) => self.send(request).await.map(drop),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("⚠️ Server logout failed: {}", e);
        }

        self.session_store.clear();
        info!("👋 Signed out");
        true
    }
}

#[async_trait]
impl ProductsApi for ProductsHttpClient {
    async fn list_products(&self, query: PageQuery) -> Result<ListResponse, ApiError> {
        let request = self
            .request(Method::GET, PRODUCTS_PATH)?
            .query(&[("offset", query.offset), ("limit", query.limit)]);
        let response = self.send(request).await?;

        let header = response
            .headers()
            .get(TOTAL_COUNT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let items: Vec<Product> = response.json().await.map_err(map_transport_error)?;
        let total = parse_total_count(header.as_deref(), items.len());

        debug!("Fetched {} product(s) at offset {} (total {})", items.len(), query.offset, total);
        Ok(ListResponse {
            items,
            total,
            offset: query.offset,
            limit: query.limit,
        })
    }

    async fn create_product(&self, payload: &ProductPayload) -> Result<QueuedOperation, ApiError> {
        let request = self.request(Method::POST, PRODUCTS_PATH)?.json(payload);
        self.send_mutation(request).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        payload: &ProductPayload,
    ) -> Result<QueuedOperation, ApiError> {
        let request = self.request(Method::PUT, &Self::product_path(id))?.json(payload);
        self.send_mutation(request).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<QueuedOperation, ApiError> {
        let request = self.request(Method::DELETE, &Self::product_path(id))?;
        self.send_mutation(request).await
    }
}
