//! Reconciliation scheduler
//!
//! After a queued mutation is accepted the scheduler polls the list endpoint
//! until the recorded [`MutationIntent`] becomes observable, the attempt budget
//! runs out, the session is cancelled, or a poll fails.
//!
//! ```text
//! Idle -> Polling -> {Satisfied, Exhausted, Cancelled, Errored}
//! ```
//!
//! At most one session is active per scheduler. [`ReconciliationScheduler::start`]
//! supersedes whatever was running: the previous session's cancellation token
//! fires before the new task is spawned, and a response that was already in
//! flight for the old session is dropped instead of being applied.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::error_classifier::ApiError;
use crate::application::ports::ProductsApi;
use crate::domain::{ListResponse, MatchPolicy, MutationIntent, PageQuery, normalize_offset};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(800);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Cadence, attempt budget and match tolerances of a poll session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub match_policy: MatchPolicy,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            match_policy: MatchPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll-{}", self.0)
    }
}

/// One reconciliation run. Owned by the poll task for its whole lifetime.
#[derive(Debug)]
pub struct PollSession {
    id: SessionId,
    intent: MutationIntent,
    attempts_made: u32,
    cancellation: CancellationToken,
}

impl PollSession {
    pub fn new(id: SessionId, intent: MutationIntent) -> Self {
        Self {
            id,
            intent,
            attempts_made: 0,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn intent(&self) -> &MutationIntent {
        &self.intent
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn retarget(&mut self, query: PageQuery) {
        self.intent = self.intent.clone().with_query(query);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerPhase {
    Idle,
    Polling,
    Satisfied,
    Exhausted,
    Cancelled,
    Errored,
}

impl SchedulerPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::Polling)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Satisfied {
        attempts: u32,
        response: ListResponse,
    },
    /// Budget spent without confirmation. Not an error: the mutation may still land.
    Exhausted {
        attempts: u32,
        last_response: Option<ListResponse>,
    },
    Cancelled {
        attempts: u32,
    },
    Errored {
        attempts: u32,
        error: ApiError,
    },
}

impl PollOutcome {
    pub fn phase(&self) -> SchedulerPhase {
        match self {
            Self::Satisfied { .. } => SchedulerPhase::Satisfied,
            Self::Exhausted { .. } => SchedulerPhase::Exhausted,
            Self::Cancelled { .. } => SchedulerPhase::Cancelled,
            Self::Errored { .. } => SchedulerPhase::Errored,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Satisfied { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts }
            | Self::Errored { attempts, .. } => *attempts,
        }
    }
}

/// Receiver of poll results, normally the page controller.
#[async_trait]
pub trait PollObserver: Send + Sync {
    /// Apply one poll response fetched for `requested` to the displayed state.
    ///
    /// Returns `false` when `session` no longer owns the displayed state; the
    /// loop then stops as cancelled without applying anything further.
    async fn apply_response(&self, session: SessionId, requested: PageQuery, response: &ListResponse) -> bool;

    /// Called exactly once when the session reaches a terminal phase
    async fn finish(&self, session: &PollSession, outcome: &PollOutcome);
}

/// Drive a single poll session to a terminal outcome.
///
/// Attempt 0 is issued immediately; later attempts wait `policy.interval`
/// first. A failed list query ends the session; it is never retried here.
pub async fn run_session(
    api: &dyn ProductsApi,
    session: &mut PollSession,
    policy: &PollPolicy,
    observer: &dyn PollObserver,
) -> PollOutcome {
    let cancellation = session.cancellation_token();
    let mut latest: Option<ListResponse> = None;

    info!(
        "🔄 {} started: {} (previous total {}, up to {} attempts)",
        session.id,
        session.intent.kind(),
        session.intent.previous_total(),
        policy.max_attempts
    );

    while session.attempts_made < policy.max_attempts {
        if session.attempts_made > 0 {
            let cancelled = tokio::select! {
                biased;
                () = cancellation.cancelled() => true,
                () = tokio::time::sleep(policy.interval) => false,
            };
            if cancelled {
                return cancelled_outcome(session);
            }
        }

        let requested = session.intent.query();
        let result = tokio::select! {
            biased;
            () = cancellation.cancelled() => None,
            result = api.list_products(requested) => Some(result),
        };
        let Some(result) = result else {
            return cancelled_outcome(session);
        };
        session.attempts_made += 1;

        if session.is_cancelled() {
            return cancelled_outcome(session);
        }

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                warn!("❌ {} attempt {} failed: {}", session.id, session.attempts_made, error);
                return PollOutcome::Errored {
                    attempts: session.attempts_made,
                    error,
                };
            }
        };

        if !observer.apply_response(session.id, requested, &response).await {
            debug!("{} superseded while applying attempt {}", session.id, session.attempts_made);
            return cancelled_outcome(session);
        }

        let corrected = normalize_offset(response.total, requested.offset, requested.limit);
        if corrected != requested.offset {
            let query = PageQuery::new(corrected, requested.limit);
            debug!(
                "📐 {} page drifted: offset {} -> {} (total {})",
                session.id, requested.offset, corrected, response.total
            );
            session.retarget(query);
        }

        if session.intent.is_satisfied(&response, &policy.match_policy) {
            info!("✅ {} satisfied after {} attempt(s)", session.id, session.attempts_made);
            return PollOutcome::Satisfied {
                attempts: session.attempts_made,
                response,
            };
        }

        debug!(
            "⏳ {} attempt {}/{} not yet visible (total {})",
            session.id, session.attempts_made, policy.max_attempts, response.total
        );
        latest = Some(response);
    }

    info!("⌛ {} exhausted after {} attempt(s)", session.id, session.attempts_made);
    PollOutcome::Exhausted {
        attempts: session.attempts_made,
        last_response: latest,
    }
}

fn cancelled_outcome(session: &PollSession) -> PollOutcome {
    debug!("🛑 {} cancelled after {} attempt(s)", session.id, session.attempts_made);
    PollOutcome::Cancelled {
        attempts: session.attempts_made,
    }
}

/// Latest phase together with the session it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSnapshot {
    pub session: Option<SessionId>,
    pub phase: SchedulerPhase,
}

struct ActiveSession {
    id: SessionId,
    cancellation: CancellationToken,
    handle: Option<JoinHandle<PollOutcome>>,
}

/// Owns the poll task of one page controller
pub struct ReconciliationScheduler {
    api: Arc<dyn ProductsApi>,
    policy: PollPolicy,
    active: Mutex<Option<ActiveSession>>,
    phase_tx: Arc<watch::Sender<PhaseSnapshot>>,
}

impl ReconciliationScheduler {
    pub fn new(api: Arc<dyn ProductsApi>, policy: PollPolicy) -> Self {
        let (phase_tx, _) = watch::channel(PhaseSnapshot {
            session: None,
            phase: SchedulerPhase::Idle,
        });

        Self {
            api,
            policy,
            active: Mutex::new(None),
            phase_tx: Arc::new(phase_tx),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase_tx.borrow().phase
    }

    pub fn snapshot(&self) -> PhaseSnapshot {
        *self.phase_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PhaseSnapshot> {
        self.phase_tx.subscribe()
    }

    /// Session currently polling, if any
    pub fn active_session(&self) -> Option<SessionId> {
        let snapshot = self.snapshot();
        (snapshot.phase == SchedulerPhase::Polling)
            .then_some(snapshot.session)
            .flatten()
    }

    /// Cancel the running session (if any) and start `session` in its place.
    pub fn start(&self, session: PollSession, observer: Arc<dyn PollObserver>) -> SessionId {
        let id = session.id();
        let cancellation = session.cancellation_token();

        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            previous.cancellation.cancel();
            info!("🔁 {} superseded by {}", previous.id, id);
        }

        self.phase_tx.send_replace(PhaseSnapshot {
            session: Some(id),
            phase: SchedulerPhase::Polling,
        });

        let api = Arc::clone(&self.api);
        let policy = self.policy;
        let phase_tx = Arc::clone(&self.phase_tx);
        let handle = tokio::spawn(async move {
            let mut session = session;
            let outcome = run_session(api.as_ref(), &mut session, &policy, observer.as_ref()).await;
            observer.finish(&session, &outcome).await;
            let phase = outcome.phase();
            phase_tx.send_if_modified(|snapshot| {
                if snapshot.session == Some(id) && snapshot.phase == SchedulerPhase::Polling {
                    snapshot.phase = phase;
                    true
                } else {
                    false
                }
            });
            outcome
        });

        *active = Some(ActiveSession {
            id,
            cancellation,
            handle: Some(handle),
        });
        id
    }

    /// Stop the running session without producing any user-visible effect.
    pub fn cancel(&self) -> Option<SessionId> {
        let previous = self.lock_active().take()?;
        previous.cancellation.cancel();

        let id = previous.id;
        let changed = self.phase_tx.send_if_modified(|snapshot| {
            if snapshot.session == Some(id) && snapshot.phase == SchedulerPhase::Polling {
                snapshot.phase = SchedulerPhase::Cancelled;
                true
            } else {
                false
            }
        });
        if changed {
            info!("🛑 {} cancelled", id);
        }
        Some(id)
    }

    /// Wait for the current session's task. Returns `None` when nothing was
    /// started, the session was cancelled, or it has already been joined.
    pub async fn join(&self) -> Option<PollOutcome> {
        let handle = {
            let mut active = self.lock_active();
            active.as_mut().and_then(|session| session.handle.take())
        }?;

        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                warn!("Poll task ended abnormally: {}", error);
                None
            }
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        if let Some(active) = self.lock_active().take() {
            active.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MutationRequest, ProductPayload};
    use crate::test_utils::{ScriptedApi, product, products_page, totals_page};
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingObserver {
        applied: Mutex<Vec<(SessionId, PageQuery, u64)>>,
        finished: Mutex<Vec<(SessionId, SchedulerPhase)>>,
        reject: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl PollObserver for RecordingObserver {
        async fn apply_response(&self, session: SessionId, requested: PageQuery, response: &ListResponse) -> bool {
            if self.reject.load(std::sync::atomic::Ordering::SeqCst) {
                return false;
            }
            self.applied.lock().unwrap().push((session, requested, response.total));
            true
        }

        async fn finish(&self, session: &PollSession, outcome: &PollOutcome) {
            self.finished.lock().unwrap().push((session.id(), outcome.phase()));
        }
    }

    fn delete_intent(previous_total: u64, query: PageQuery) -> MutationIntent {
        MutationIntent::for_request(&MutationRequest::Delete { id: 1 }, previous_total, query)
    }

    fn create_intent(previous_total: u64) -> MutationIntent {
        let payload = ProductPayload::normalized("Teclado", "ACME", 150.0).unwrap();
        MutationIntent::for_request(&MutationRequest::Create(payload), previous_total, PageQuery::first(10))
    }

    #[tokio::test(start_paused = true)]
    async fn delete_is_satisfied_on_third_response() {
        let api = ScriptedApi::new();
        api.push_list(totals_page(1));
        api.push_list(totals_page(1));
        api.push_list(totals_page(0));
        let observer = RecordingObserver::default();
        let mut session = PollSession::new(SessionId::new(1), delete_intent(1, PageQuery::first(10)));

        let outcome = run_session(api.as_ref(), &mut session, &PollPolicy::default(), &observer).await;

        assert!(matches!(outcome, PollOutcome::Satisfied { attempts: 3, .. }));
        assert_eq!(session.attempts_made(), 3);
        assert_eq!(api.list_queries().len(), 3);
        assert_eq!(observer.applied.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_query_has_no_delay_then_fixed_interval() {
        let api = ScriptedApi::new();
        api.set_list_fallback(Ok(totals_page(5)));
        let observer = RecordingObserver::default();
        let mut session = PollSession::new(SessionId::new(1), create_intent(5));
        let started = Instant::now();

        let outcome = run_session(api.as_ref(), &mut session, &PollPolicy::default(), &observer).await;

        let times = api.list_call_times();
        assert_eq!(times.len(), 8);
        assert_eq!(times[0], started);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], DEFAULT_POLL_INTERVAL);
        }
        match outcome {
            PollOutcome::Exhausted { attempts, last_response } => {
                assert_eq!(attempts, 8);
                assert_eq!(last_response.map(|response| response.total), Some(5));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_budget_is_configurable() {
        let api = ScriptedApi::new();
        api.set_list_fallback(Ok(totals_page(2)));
        let policy = PollPolicy {
            interval: Duration::from_millis(50),
            max_attempts: 3,
            ..PollPolicy::default()
        };
        let mut session = PollSession::new(SessionId::new(1), create_intent(2));

        let outcome = run_session(api.as_ref(), &mut session, &policy, &RecordingObserver::default()).await;

        assert_eq!(outcome.phase(), SchedulerPhase::Exhausted);
        assert_eq!(api.list_queries().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_poll_is_terminal() {
        let api = ScriptedApi::new();
        api.push_list(totals_page(3));
        api.push_list_error(ApiError::Transport("connection reset".into()));
        api.set_list_fallback(Ok(totals_page(4)));
        let mut session = PollSession::new(SessionId::new(1), create_intent(3));

        let outcome = run_session(api.as_ref(), &mut session, &PollPolicy::default(), &RecordingObserver::default()).await;

        assert_eq!(
            outcome,
            PollOutcome::Errored {
                attempts: 2,
                error: ApiError::Transport("connection reset".into()),
            }
        );
        assert_eq!(api.list_queries().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drifted_page_rewrites_the_polled_query() {
        let api = ScriptedApi::new();
        // Viewing offset 20 while the collection has already shrunk to 20 items.
        api.push_list(totals_page(20));
        api.push_list(totals_page(20));
        let observer = RecordingObserver::default();
        let mut session = PollSession::new(SessionId::new(1), delete_intent(20, PageQuery::new(20, 10)));
        let policy = PollPolicy {
            max_attempts: 2,
            ..PollPolicy::default()
        };

        run_session(api.as_ref(), &mut session, &policy, &observer).await;

        assert_eq!(api.list_queries(), vec![PageQuery::new(20, 10), PageQuery::new(10, 10)]);
        assert_eq!(session.intent().query(), PageQuery::new(10, 10));
    }

    #[tokio::test(start_paused = true)]
    async fn update_waits_for_matching_record() {
        let api = ScriptedApi::new();
        api.push_list(products_page(vec![product(1, "Mouse", "ACME", 100.0)], 1, PageQuery::first(10)));
        api.push_list(products_page(vec![product(1, "Mouse Pro", "ACME", 100.0)], 1, PageQuery::first(10)));
        let payload = ProductPayload::normalized("Mouse Pro", "ACME", 100.0).unwrap();
        let intent = MutationIntent::for_request(
            &MutationRequest::Update { id: 1, payload },
            1,
            PageQuery::first(10),
        );
        let mut session = PollSession::new(SessionId::new(1), intent);

        let outcome = run_session(api.as_ref(), &mut session, &PollPolicy::default(), &RecordingObserver::default()).await;

        assert!(matches!(outcome, PollOutcome::Satisfied { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_observer_stops_the_loop() {
        let api = ScriptedApi::new();
        api.set_list_fallback(Ok(totals_page(1)));
        let observer = RecordingObserver::default();
        observer.reject.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut session = PollSession::new(SessionId::new(1), create_intent(1));

        let outcome = run_session(api.as_ref(), &mut session, &PollPolicy::default(), &observer).await;

        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 1 });
        assert_eq!(api.list_queries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_runs_session_to_completion() {
        let api = ScriptedApi::new();
        api.push_list(totals_page(1));
        api.push_list(totals_page(0));
        let scheduler = ReconciliationScheduler::new(api.clone(), PollPolicy::default());
        let observer = Arc::new(RecordingObserver::default());

        let id = scheduler.start(
            PollSession::new(SessionId::new(7), delete_intent(1, PageQuery::first(10))),
            observer.clone(),
        );
        assert_eq!(scheduler.active_session(), Some(id));

        let outcome = scheduler.join().await.unwrap();

        assert_eq!(outcome.attempts(), 2);
        assert_eq!(scheduler.phase(), SchedulerPhase::Satisfied);
        assert_eq!(scheduler.active_session(), None);
        assert_eq!(*observer.finished.lock().unwrap(), vec![(id, SchedulerPhase::Satisfied)]);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_a_second_session_cancels_the_first() {
        let api = ScriptedApi::new();
        api.set_list_latency(Duration::from_millis(300));
        api.set_list_fallback(Ok(totals_page(1)));
        let scheduler = ReconciliationScheduler::new(api.clone(), PollPolicy::default());
        let first_observer = Arc::new(RecordingObserver::default());
        let second_observer = Arc::new(RecordingObserver::default());

        let first = scheduler.start(PollSession::new(SessionId::new(1), create_intent(1)), first_observer.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = scheduler.start(PollSession::new(SessionId::new(2), create_intent(0)), second_observer.clone());

        let outcome = scheduler.join().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(outcome.phase(), SchedulerPhase::Satisfied);
        assert!(first_observer.applied.lock().unwrap().is_empty());
        assert_eq!(
            *first_observer.finished.lock().unwrap(),
            vec![(first, SchedulerPhase::Cancelled)]
        );
        assert_eq!(scheduler.snapshot().session, Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling_without_applying() {
        let api = ScriptedApi::new();
        api.set_list_latency(Duration::from_millis(300));
        api.set_list_fallback(Ok(totals_page(2)));
        let scheduler = ReconciliationScheduler::new(api.clone(), PollPolicy::default());
        let observer = Arc::new(RecordingObserver::default());

        let id = scheduler.start(PollSession::new(SessionId::new(3), create_intent(1)), observer.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(scheduler.cancel(), Some(id));
        assert_eq!(scheduler.phase(), SchedulerPhase::Cancelled);
        assert!(scheduler.join().await.is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(observer.applied.lock().unwrap().is_empty());
        assert_eq!(api.list_queries().len(), 1);
    }
}
