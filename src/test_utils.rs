//! Test utilities for catalog-reconciler
//!
//! A scripted in-memory [`ProductsApi`] plus small builders for list pages.
//! Timings are recorded with `tokio::time::Instant` so tests running on a
//! paused clock can assert the poll cadence exactly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::application::error_classifier::ApiError;
use crate::application::ports::ProductsApi;
use crate::domain::{
    AckStatus, ListResponse, MutationRequest, PageQuery, Product, ProductId, ProductPayload,
    QueuedOperation,
};

/// Fake backend answering from pre-loaded scripts
#[derive(Default)]
pub struct ScriptedApi {
    list_script: Mutex<VecDeque<Result<ListResponse, ApiError>>>,
    list_fallback: Mutex<Option<Result<ListResponse, ApiError>>>,
    list_calls: Mutex<Vec<(PageQuery, Instant)>>,
    list_latency: Mutex<Duration>,
    mutation_script: Mutex<VecDeque<Result<QueuedOperation, ApiError>>>,
    mutation_calls: Mutex<Vec<MutationRequest>>,
    mutation_latency: Mutex<Duration>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_list(&self, response: ListResponse) {
        self.list_script.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_list_error(&self, error: ApiError) {
        self.list_script.lock().unwrap().push_back(Err(error));
    }

    /// Answer used once the script runs dry
    pub fn set_list_fallback(&self, result: Result<ListResponse, ApiError>) {
        *self.list_fallback.lock().unwrap() = Some(result);
    }

    pub fn set_list_latency(&self, latency: Duration) {
        *self.list_latency.lock().unwrap() = latency;
    }

    pub fn push_mutation(&self, result: Result<QueuedOperation, ApiError>) {
        self.mutation_script.lock().unwrap().push_back(result);
    }

    pub fn set_mutation_latency(&self, latency: Duration) {
        *self.mutation_latency.lock().unwrap() = latency;
    }

    pub fn list_queries(&self) -> Vec<PageQuery> {
        self.list_calls.lock().unwrap().iter().map(|(query, _)| *query).collect()
    }

    pub fn list_call_times(&self) -> Vec<Instant> {
        self.list_calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn mutation_calls(&self) -> Vec<MutationRequest> {
        self.mutation_calls.lock().unwrap().clone()
    }

    async fn mutate(&self, request: MutationRequest) -> Result<QueuedOperation, ApiError> {
        let kind = request.kind();
        let target_id = request.target_id();
        let call_number = {
            let mut calls = self.mutation_calls.lock().unwrap();
            calls.push(request);
            calls.len()
        };

        let latency = *self.mutation_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.mutation_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(QueuedOperation {
                status: AckStatus::Queued,
                operation: kind,
                operation_id: format!("op-{call_number}"),
                target_id,
            })
        })
    }
}

#[async_trait]
impl ProductsApi for ScriptedApi {
    async fn list_products(&self, query: PageQuery) -> Result<ListResponse, ApiError> {
        self.list_calls.lock().unwrap().push((query, Instant::now()));

        let latency = *self.list_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.list_script.lock().unwrap().pop_front();
        scripted
            .or_else(|| self.list_fallback.lock().unwrap().clone())
            .unwrap_or_else(|| Ok(ListResponse::empty(query)))
    }

    async fn create_product(&self, payload: &ProductPayload) -> Result<QueuedOperation, ApiError> {
        self.mutate(MutationRequest::Create(payload.clone())).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        payload: &ProductPayload,
    ) -> Result<QueuedOperation, ApiError> {
        self.mutate(MutationRequest::Update {
            id,
            payload: payload.clone(),
        })
        .await
    }

    async fn delete_product(&self, id: ProductId) -> Result<QueuedOperation, ApiError> {
        self.mutate(MutationRequest::Delete { id }).await
    }
}

pub fn product(id: ProductId, name: &str, brand: &str, price: f64) -> Product {
    Product {
        id,
        name: name.to_string(),
        brand: brand.to_string(),
        price,
        created_at: None,
        updated_at: None,
    }
}

pub fn products_page(items: Vec<Product>, total: u64, query: PageQuery) -> ListResponse {
    ListResponse {
        items,
        total,
        offset: query.offset,
        limit: query.limit,
    }
}

/// First page of ten with no items, only a total
pub fn totals_page(total: u64) -> ListResponse {
    products_page(Vec::new(), total, PageQuery::first(10))
}
