//! Products page controller
//!
//! Owns the displayed page (items, pagination, busy flags) and is the only
//! writer of that state. Every write is tagged with a generation number:
//! loads and poll sessions carry the generation they started under, and a
//! completion whose generation is no longer current is dropped. Starting a
//! mutation, changing page or leaving the view bumps the generation, which is
//! what makes late responses from superseded work harmless.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use async_trait::async_trait;

use crate::application::error_classifier::{
    ApiError, Classification, Operation, RecoveryAction, classify, validation_message,
};
use crate::application::ports::{
    LoginRedirect, Navigator, Notice, NoticeLevel, Notifier, ProductsApi, SessionStore,
};
use crate::application::reconciliation::{
    PollObserver, PollOutcome, PollPolicy, PollSession, ReconciliationScheduler, SchedulerPhase,
    SessionId,
};
use crate::domain::{
    ListResponse, MutationIntent, MutationRequest, OperationKind, PageQuery, PaginationState,
    PayloadError, Product, ProductId, ProductPayload, QueuedOperation,
};

pub const STILL_PROCESSING_MESSAGE: &str =
    "The operation is still being processed. The list will update shortly.";
const INVALID_PAYLOAD_MESSAGE: &str = "The product data is invalid.";

fn queued_message(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Create => "Product creation queued.",
        OperationKind::Update => "Product update queued.",
        OperationKind::Delete => "Product deletion queued.",
    }
}

fn confirmed_message(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Create => "Product created.",
        OperationKind::Update => "Product updated.",
        OperationKind::Delete => "Product deleted.",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub default_limit: u64,
    pub login_route: String,
    pub return_route: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            login_route: "/login".to_string(),
            return_route: "/products".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryState {
    pub is_loading: bool,
    pub is_polling: bool,
    pub error_message: Option<String>,
}

/// Snapshot of everything the page displays
#[derive(Debug, Clone, PartialEq)]
pub struct ProductsView {
    pub products: Vec<Product>,
    pub pagination: PaginationState,
    pub query_state: QueryState,
    pub is_submitting: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded { query: PageQuery, total: u64 },
    /// Another load is still in flight
    Rejected,
    /// Superseded before the response arrived; nothing was applied
    Discarded,
    Failed(Classification),
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Queued { ack: QueuedOperation, session: SessionId },
    /// Accepted, but the page changed or was left before the acknowledgement
    /// arrived; nothing is reconciled
    Superseded { ack: QueuedOperation },
    /// No page was ever loaded, so there is no total to compare against
    NotLoaded(LoadOutcome),
    Invalid(PayloadError),
    /// A previous mutation is still waiting for its acknowledgement
    Busy,
    Failed(Classification),
    Unauthenticated,
}

struct ViewState {
    view: ProductsView,
    generation: u64,
    active_session: Option<SessionId>,
    /// Set by the first successful load; mutations need its total
    loaded: bool,
}

impl ViewState {
    /// Invalidate in-flight loads and poll sessions
    fn supersede(&mut self) -> u64 {
        self.generation += 1;
        self.active_session = None;
        self.view.query_state.is_polling = false;
        self.view.query_state.is_loading = false;
        self.generation
    }

    fn begin_load(&mut self) -> u64 {
        let ticket = self.supersede();
        self.view.query_state.is_loading = true;
        self.view.query_state.error_message = None;
        ticket
    }
}

struct ControllerInner {
    api: Arc<dyn ProductsApi>,
    session_store: Arc<dyn SessionStore>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    settings: ControllerSettings,
    state: RwLock<ViewState>,
}

impl ControllerInner {
    fn ensure_authenticated(&self) -> bool {
        if self.session_store.is_authenticated() {
            return true;
        }
        info!("🔒 No session token, redirecting to {}", self.settings.login_route);
        self.navigator.redirect_to_login(&self.login_redirect());
        false
    }

    fn login_redirect(&self) -> LoginRedirect {
        LoginRedirect {
            route: self.settings.login_route.clone(),
            return_path: self.settings.return_route.clone(),
        }
    }

    /// Fetch `query` under `ticket`, following at most one offset correction.
    async fn fetch(&self, query: PageQuery, ticket: u64) -> LoadOutcome {
        let mut query = query;
        let mut corrected_once = false;

        loop {
            let result = self.api.list_products(query).await;

            let mut state = self.state.write().await;
            if state.generation != ticket {
                debug!("Discarding stale load for offset {} (ticket {})", query.offset, ticket);
                return LoadOutcome::Discarded;
            }

            match result {
                Ok(response) => {
                    let total = response.total;
                    let correction = state.view.pagination.observe(query, total);
                    state.view.products = response.items;

                    if let (Some(corrected), false) = (correction, corrected_once) {
                        debug!("📐 Page {} fell off the end, reloading at {}", query.offset, corrected.offset);
                        corrected_once = true;
                        query = corrected;
                        continue;
                    }

                    state.view.query_state.is_loading = false;
                    state.loaded = true;
                    return LoadOutcome::Loaded {
                        query: state.view.pagination.query(),
                        total,
                    };
                }
                Err(error) => {
                    state.view.query_state.is_loading = false;
                    drop(state);
                    return LoadOutcome::Failed(self.handle_failure(&error, Operation::Load).await);
                }
            }
        }
    }

    /// Non-polling re-fetch of the displayed page
    async fn refetch_current(&self) -> LoadOutcome {
        let (query, ticket) = {
            let mut state = self.state.write().await;
            if state.view.query_state.is_loading {
                return LoadOutcome::Rejected;
            }
            let ticket = state.begin_load();
            (state.view.pagination.query(), ticket)
        };
        self.fetch(query, ticket).await
    }

    /// Classify `error`, surface its notice and apply its state transition.
    ///
    /// The re-fetch of [`RecoveryAction::Refetch`] is left to the caller.
    async fn handle_failure(&self, error: &ApiError, operation: Operation) -> Classification {
        let classification = classify(error, operation);
        warn!(
            "⚠️ {:?} failed: {} (class {:?}, action {:?})",
            operation, error, classification.class, classification.action
        );

        if operation == Operation::Load && classification.level == NoticeLevel::Error {
            self.state.write().await.view.query_state.error_message = Some(classification.message.clone());
        }

        self.notifier
            .notify(Notice::new(classification.level, classification.message.clone()));

        if classification.action == RecoveryAction::InvalidateSession {
            self.session_store.clear();
            self.state.write().await.supersede();
            self.navigator.redirect_to_login(&self.login_redirect());
        }

        classification
    }
}

#[async_trait]
impl PollObserver for ControllerInner {
    async fn apply_response(&self, session: SessionId, requested: PageQuery, response: &ListResponse) -> bool {
        let mut state = self.state.write().await;
        if state.active_session != Some(session) {
            return false;
        }
        state.view.pagination.observe(requested, response.total);
        state.view.products.clone_from(&response.items);
        true
    }

    async fn finish(&self, session: &PollSession, outcome: &PollOutcome) {
        {
            let mut state = self.state.write().await;
            if state.active_session != Some(session.id()) {
                return;
            }
            state.active_session = None;
            state.view.query_state.is_polling = false;
        }

        let kind = session.intent().kind();
        match outcome {
            PollOutcome::Satisfied { response, .. } => {
                self.notifier.notify(Notice::success(confirmed_message(kind)));
                if response.query() != session.intent().query() {
                    debug!("📐 {} confirmed off the end, reloading the corrected page", session.id());
                    self.refetch_current().await;
                }
            }
            PollOutcome::Exhausted { .. } => {
                self.notifier.notify(Notice::info(STILL_PROCESSING_MESSAGE));
            }
            PollOutcome::Cancelled { .. } => {}
            PollOutcome::Errored { error, .. } => {
                let classification = self.handle_failure(error, Operation::Load).await;
                if classification.action == RecoveryAction::Refetch {
                    self.refetch_current().await;
                }
            }
        }
    }
}

/// Interactive logic of the products page
pub struct ProductsController {
    inner: Arc<ControllerInner>,
    scheduler: ReconciliationScheduler,
}

impl ProductsController {
    pub fn new(
        api: Arc<dyn ProductsApi>,
        session_store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        policy: PollPolicy,
        settings: ControllerSettings,
    ) -> Self {
        let view = ProductsView {
            products: Vec::new(),
            pagination: PaginationState::new(settings.default_limit),
            query_state: QueryState::default(),
            is_submitting: false,
        };
        let scheduler = ReconciliationScheduler::new(Arc::clone(&api), policy);

        Self {
            inner: Arc::new(ControllerInner {
                api,
                session_store,
                notifier,
                navigator,
                settings,
                state: RwLock::new(ViewState {
                    view,
                    generation: 0,
                    active_session: None,
                    loaded: false,
                }),
            }),
            scheduler,
        }
    }

    pub async fn view(&self) -> ProductsView {
        self.inner.state.read().await.view.clone()
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.scheduler.phase()
    }

    pub fn scheduler(&self) -> &ReconciliationScheduler {
        &self.scheduler
    }

    /// Load the first page with the configured page size
    pub async fn initialize(&self) -> LoadOutcome {
        let query = PageQuery::first(self.inner.settings.default_limit);
        self.change_page(query).await
    }

    /// Show another page. Rejected while a load is in flight; an active poll
    /// session is cancelled first.
    pub async fn change_page(&self, query: PageQuery) -> LoadOutcome {
        if !self.inner.ensure_authenticated() {
            return LoadOutcome::Unauthenticated;
        }

        let ticket = {
            let mut state = self.inner.state.write().await;
            if state.view.query_state.is_loading {
                debug!("Ignoring page change to offset {} while loading", query.offset);
                return LoadOutcome::Rejected;
            }
            state.begin_load()
        };
        self.scheduler.cancel();

        self.inner.fetch(query, ticket).await
    }

    /// Explicit retry through the standard load path
    pub async fn reload(&self) -> LoadOutcome {
        let query = self.inner.state.read().await.view.pagination.query();
        self.change_page(query).await
    }

    pub async fn create(&self, payload: ProductPayload) -> MutationOutcome {
        self.submit(MutationRequest::Create(payload)).await
    }

    pub async fn update(&self, id: ProductId, payload: ProductPayload) -> MutationOutcome {
        self.submit(MutationRequest::Update { id, payload }).await
    }

    pub async fn delete(&self, id: ProductId) -> MutationOutcome {
        self.submit(MutationRequest::Delete { id }).await
    }

    /// Send a mutation and, once it is queued, start reconciling it.
    pub async fn submit(&self, request: MutationRequest) -> MutationOutcome {
        if !self.inner.ensure_authenticated() {
            return MutationOutcome::Unauthenticated;
        }

        let request = match request.normalized() {
            Ok(request) => request,
            Err(error) => {
                let message = validation_message(error.code()).unwrap_or(INVALID_PAYLOAD_MESSAGE);
                self.inner.notifier.notify(Notice::error(message));
                return MutationOutcome::Invalid(error);
            }
        };
        let kind = request.kind();

        if !self.inner.state.read().await.loaded {
            debug!("No page loaded yet, loading before {}", kind);
            match self.reload().await {
                LoadOutcome::Loaded { .. } => {}
                outcome => return MutationOutcome::NotLoaded(outcome),
            }
        }

        let (previous_total, query, ticket) = {
            let mut state = self.inner.state.write().await;
            if state.view.is_submitting {
                debug!("Ignoring {} while another mutation is being submitted", kind);
                return MutationOutcome::Busy;
            }
            state.view.is_submitting = true;
            let ticket = state.supersede();
            (state.view.pagination.total(), state.view.pagination.query(), ticket)
        };
        self.scheduler.cancel();

        let api = &self.inner.api;
        let result = match &request {
            MutationRequest::Create(payload) => api.create_product(payload).await,
            MutationRequest::Update { id, payload } => api.update_product(*id, payload).await,
            MutationRequest::Delete { id } => api.delete_product(*id).await,
        };

        let ack = match result {
            Ok(ack) => ack,
            Err(error) => {
                let current = {
                    let mut state = self.inner.state.write().await;
                    state.view.is_submitting = false;
                    state.generation == ticket
                };
                let classification = self.inner.handle_failure(&error, Operation::from(kind)).await;
                if current && classification.action == RecoveryAction::Refetch {
                    self.inner.refetch_current().await;
                }
                return MutationOutcome::Failed(classification);
            }
        };

        info!("📨 {} queued as operation {}", kind, ack.operation_id);
        self.inner.notifier.notify(Notice::info(queued_message(kind)));

        let intent = MutationIntent::for_request(&request, previous_total, query);
        let session = {
            let mut state = self.inner.state.write().await;
            state.view.is_submitting = false;
            if state.generation != ticket {
                debug!("{} acknowledged after the view moved on, not reconciling", ack.operation_id);
                return MutationOutcome::Superseded { ack };
            }
            let session = SessionId::new(state.supersede());
            state.active_session = Some(session);
            state.view.query_state.is_polling = true;
            session
        };

        let observer: Arc<dyn PollObserver> = self.inner.clone();
        self.scheduler.start(PollSession::new(session, intent), observer);

        MutationOutcome::Queued { ack, session }
    }

    /// Wait until the current poll session ends
    pub async fn settle(&self) -> Option<PollOutcome> {
        self.scheduler.join().await
    }

    /// Tear the view down: stop polling and drop any in-flight completions
    pub async fn leave(&self) {
        self.inner.state.write().await.supersede();
        if let Some(session) = self.scheduler.cancel() {
            debug!("{} stopped on leave", session);
        }
    }
}
