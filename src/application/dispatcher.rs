//! # Dispatcher
//!
//! The single owning loop of an outreach run. Drives one recipient at a time through
//! gate checks, composition, sending and tracking, and records progress so a stopped
//! or crashed run can pick up where it left off.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::application::business_hours::BusinessHoursGate;
use crate::application::composer::MessageComposer;
use crate::application::queue::{CustomerQueue, QueueItem};
use crate::application::rate_gate::RateGate;
use crate::application::state::{CheckpointStore, RunCheckpoint};
use crate::application::utils::{StopSignal, wait_with_abort};
use crate::domain::config::{AppConfig, FailurePolicy, FailurePolicyConfig};
use crate::domain::error::{DispatchError, DispatchResult};
use crate::domain::traits::{Clock, CustomerSource, Generator, MessageSender, StatusObserver, Tracker};
use crate::domain::types::{Customer, DispatchAttempt, DispatchOutcome, StatusLevel, TrackingRecord};
use crate::strings::logs;

/// Observable phase of a run. `Done` is terminal and distinct from `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchState {
    #[default]
    Idle,
    Loading,
    Iterating,
    Gating,
    Composing,
    Sending,
    Tracking,
    Done,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchState::Idle => "idle",
            DispatchState::Loading => "loading",
            DispatchState::Iterating => "iterating",
            DispatchState::Gating => "gating",
            DispatchState::Composing => "composing",
            DispatchState::Sending => "sending",
            DispatchState::Tracking => "tracking",
            DispatchState::Done => "done",
        };
        f.write_str(name)
    }
}

/// External services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn CustomerSource>,
    pub generator: Arc<dyn Generator>,
    pub sender: Arc<dyn MessageSender>,
    pub tracker: Arc<dyn Tracker>,
    pub observer: Arc<dyn StatusObserver>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// `Done` on completion, `Idle` when stopped early.
    pub state: DispatchState,
}

struct Timeouts {
    source: Duration,
    send: Duration,
    track: Duration,
}

pub struct Dispatcher {
    state: DispatchState,
    queue: CustomerQueue,
    rate_gate: RateGate,
    hours: BusinessHoursGate,
    composer: MessageComposer,
    source: Arc<dyn CustomerSource>,
    sender: Arc<dyn MessageSender>,
    tracker: Arc<dyn Tracker>,
    observer: Arc<dyn StatusObserver>,
    clock: Arc<dyn Clock>,
    platform: String,
    timeouts: Timeouts,
    policy: FailurePolicyConfig,
    checkpoints: CheckpointStore,
    checkpoint: RunCheckpoint,
    /// Whether cursor progress is written to the checkpoint (off in test mode).
    track_progress: bool,
    failures: HashMap<String, u32>,
    summary: RunSummary,
    stop: StopSignal,
}

impl Dispatcher {
    pub fn new(
        config: &AppConfig,
        collaborators: Collaborators,
        checkpoints: CheckpointStore,
        stop: StopSignal,
    ) -> Self {
        let services = &config.services;
        let composer = MessageComposer::new(
            config.message.clone(),
            collaborators.generator,
            Duration::from_secs(services.generator.timeout_secs),
        );

        Self {
            state: DispatchState::Idle,
            queue: CustomerQueue::new(),
            rate_gate: RateGate::from_config(&config.pacing),
            hours: BusinessHoursGate::from_config(&config.business_hours),
            composer,
            source: collaborators.source,
            sender: collaborators.sender,
            tracker: collaborators.tracker,
            observer: collaborators.observer,
            clock: collaborators.clock,
            platform: services.gateway.platform.clone(),
            timeouts: Timeouts {
                source: Duration::from_secs(services.customers.timeout_secs),
                send: Duration::from_secs(services.gateway.timeout_secs),
                track: Duration::from_secs(services.tracker.timeout_secs),
            },
            policy: config.policy.clone(),
            checkpoints,
            checkpoint: RunCheckpoint::default(),
            track_progress: true,
            failures: HashMap::new(),
            summary: RunSummary::default(),
            stop,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.queue.cursor()
    }

    /// Full run: fetch the list, then dispatch until exhausted or stopped.
    /// Only a failing customer source is returned as an error.
    pub async fn run(&mut self, resume: bool) -> DispatchResult<RunSummary> {
        self.reset(true);
        self.transition(DispatchState::Loading);

        let fetched = tokio::time::timeout(self.timeouts.source, self.source.fetch()).await;
        let customers = match fetched {
            Ok(Ok(customers)) => customers,
            Ok(Err(e)) => return Err(self.abort_load(e)),
            Err(_) => {
                let reason = format!("timed out after {}s", self.timeouts.source.as_secs());
                return Err(self.abort_load(reason));
            }
        };

        self.load(customers, resume);
        Ok(self.iterate().await)
    }

    /// Dry run against a single synthetic recipient; the customer source is never called
    /// and saved progress of a real run is left untouched.
    pub async fn run_test(&mut self, customer: Customer) -> RunSummary {
        self.reset(false);
        self.notify(StatusLevel::Info, logs::TEST_MODE);
        self.transition(DispatchState::Loading);
        self.load(vec![customer], false);
        self.iterate().await
    }

    fn reset(&mut self, track_progress: bool) {
        self.track_progress = track_progress;
        self.failures.clear();
        self.summary = RunSummary::default();
        self.queue = CustomerQueue::new();
    }

    fn abort_load(&mut self, reason: String) -> DispatchError {
        self.notify(StatusLevel::Error, &logs::source_unavailable(&reason));
        self.transition(DispatchState::Idle);
        DispatchError::SourceUnavailable(reason)
    }

    fn load(&mut self, customers: Vec<Customer>, resume: bool) {
        let original_len = customers.len();
        let by_id: HashMap<String, Customer> = customers
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect();

        if let Err(e) = self.queue.load(customers) {
            tracing::debug!("Queue load: {}", e);
            self.notify(StatusLevel::Warn, logs::EMPTY_LIST);
        } else {
            self.notify(StatusLevel::Info, &logs::loaded_customers(original_len));
        }

        self.checkpoint = self.checkpoints.load();
        if let Some(last) = self.checkpoint.last_grant_at {
            let elapsed = (self.clock.now_utc() - last).to_std().unwrap_or(Duration::ZERO);
            self.rate_gate.seed_elapsed(elapsed);
        }

        if resume && self.track_progress {
            let ids = self.queue.ids();
            if self.checkpoint.matches_list(&ids) {
                let tail: Vec<Customer> = self
                    .checkpoint
                    .requeued_tail(original_len)
                    .iter()
                    .filter_map(|id| by_id.get(id).cloned())
                    .collect();
                for customer in tail {
                    self.queue.push_back(customer);
                }
                self.queue.resume_at(self.checkpoint.cursor);
                self.notify(
                    StatusLevel::Info,
                    &logs::resumed_at(self.queue.cursor(), self.queue.len()),
                );
            } else if !self.checkpoint.customer_ids.is_empty() {
                self.notify(StatusLevel::Warn, logs::CHECKPOINT_MISMATCH);
            }
        }

        self.save_progress();
    }

    async fn iterate(&mut self) -> RunSummary {
        loop {
            self.transition(DispatchState::Iterating);
            if self.queue.is_done() {
                break;
            }

            // Per-recipient failures are absorbed by `cycle`; only a stop gets out.
            if let Err(e) = self.cycle().await {
                tracing::debug!("Dispatch cycle ended: {}", e);
                self.notify(
                    StatusLevel::Warn,
                    &logs::stopped_at(self.queue.cursor(), self.queue.len()),
                );
                self.save_progress();
                self.transition(DispatchState::Idle);
                self.summary.state = DispatchState::Idle;
                return self.summary.clone();
            }
        }

        self.notify(StatusLevel::Info, logs::WORKFLOW_COMPLETE);
        if self.track_progress {
            self.checkpoint.customer_ids.clear();
            self.checkpoint.cursor = 0;
            self.persist();
        }
        self.transition(DispatchState::Done);
        self.summary.state = DispatchState::Done;
        self.summary.clone()
    }

    /// Gate, compose, send and track one recipient.
    async fn cycle(&mut self) -> DispatchResult<()> {
        self.transition(DispatchState::Gating);
        self.pass_gates().await?;

        let QueueItem::Next {
            customer,
            position,
            total,
        } = self.queue.next()
        else {
            return Ok(());
        };
        // Counted as attempted on disk before any side effect, so a crash never re-sends.
        self.save_progress();
        self.notify(StatusLevel::Info, &logs::processing(position, total));

        self.transition(DispatchState::Composing);
        let composed = self.composer.compose(&customer).await;
        let attempt = match composed {
            Ok(text) => {
                self.transition(DispatchState::Sending);
                self.deliver(customer, text).await
            }
            Err(e) => {
                self.notify(
                    StatusLevel::Error,
                    &logs::generation_failed(&customer.name, &reason(&e)),
                );
                DispatchAttempt {
                    customer,
                    generated_text: None,
                    outcome: DispatchOutcome::GenerationFailed,
                }
            }
        };

        self.transition(DispatchState::Tracking);
        self.track(attempt).await;
        self.save_progress();
        Ok(())
    }

    /// Holds the run until both gates allow the next send.
    /// Hours are re-checked after the rate wait so jitter never carries a send past closing.
    async fn pass_gates(&mut self) -> DispatchResult<()> {
        loop {
            loop {
                let decision = self.hours.check(self.clock.now_utc());
                if decision.proceed {
                    break;
                }
                let wait = decision.wait.unwrap_or(Duration::from_secs(60));
                if let Some(next) = self.queue.peek() {
                    tracing::debug!(
                        "Holding {} until business hours (local time {})",
                        next.id,
                        self.clock.now_local().format("%a %H:%M")
                    );
                }
                self.notify(StatusLevel::Warn, &logs::waiting_for_hours(wait));
                if wait_with_abort(wait, &mut self.stop).await {
                    return Err(DispatchError::Stopped);
                }
            }

            self.rate_gate.await_turn(&mut self.stop).await?;
            self.checkpoint.last_grant_at = Some(self.clock.now_utc());
            self.persist();

            if self.hours.check(self.clock.now_utc()).proceed {
                return Ok(());
            }
        }
    }

    async fn deliver(&self, customer: Customer, text: String) -> DispatchAttempt {
        let outcome = match self.send(&customer, &text).await {
            Ok(()) => {
                self.notify(StatusLevel::Info, &logs::sent_to(&customer.name));
                DispatchOutcome::Sent
            }
            Err(e) => {
                tracing::debug!("Delivery to {} failed: {}", customer.id, e);
                self.notify(StatusLevel::Error, &logs::send_failed(&customer.name, &reason(&e)));
                DispatchOutcome::SendFailed
            }
        };

        DispatchAttempt {
            customer,
            generated_text: Some(text),
            outcome,
        }
    }

    async fn send(&self, customer: &Customer, text: &str) -> DispatchResult<()> {
        let call = self.sender.send(&self.platform, &customer.id, text);
        bounded(self.timeouts.send, call)
            .await
            .map_err(DispatchError::SendFailed)
    }

    /// Best-effort tracking, then the failure policy.
    async fn track(&mut self, attempt: DispatchAttempt) {
        self.summary.attempted += 1;
        let failed = attempt.outcome != DispatchOutcome::Sent;
        if failed {
            self.summary.failed += 1;
        } else {
            self.summary.sent += 1;
        }

        let customer = attempt.customer.clone();
        let record = attempt.into_record();

        match self.write_record(&record).await {
            Ok(()) => tracing::debug!("Tracked {} as {}", record.customer_id, record.status.as_str()),
            Err(e) => self.notify(StatusLevel::Warn, &logs::tracking_failed(&reason(&e))),
        }

        if failed && self.policy.on_failure == FailurePolicy::RetryLater {
            let count = self.failures.entry(customer.id.clone()).or_insert(0);
            *count += 1;
            if *count <= self.policy.max_retries {
                let attempt_no = *count + 1;
                let max_attempts = self.policy.max_retries + 1;
                self.notify(
                    StatusLevel::Info,
                    &logs::requeued(&customer.name, attempt_no, max_attempts),
                );
                self.queue.push_back(customer);
            }
        }
    }

    async fn write_record(&self, record: &TrackingRecord) -> DispatchResult<()> {
        bounded(self.timeouts.track, self.tracker.record(record))
            .await
            .map_err(DispatchError::TrackingWriteFailed)
    }

    fn save_progress(&mut self) {
        if !self.track_progress {
            return;
        }
        self.checkpoint.customer_ids = self.queue.ids();
        self.checkpoint.cursor = self.queue.cursor();
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.checkpoints.save(&self.checkpoint) {
            self.notify(StatusLevel::Warn, &logs::checkpoint_save_fail(&format!("{e:#}")));
        }
    }

    fn transition(&mut self, next: DispatchState) {
        if self.state != next {
            tracing::debug!("Dispatcher: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn notify(&self, level: StatusLevel, message: &str) {
        self.observer.notify(level, message);
    }
}

/// Collaborator message without the taxonomy prefix, for status lines.
fn reason(error: &DispatchError) -> String {
    match error {
        DispatchError::SourceUnavailable(reason)
        | DispatchError::GenerationFailed(reason)
        | DispatchError::SendFailed(reason)
        | DispatchError::TrackingWriteFailed(reason) => reason.clone(),
        other => other.to_string(),
    }
}

/// Runs a collaborator call under a timeout; a timeout is just another failure.
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, String>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::utils::never_stop;
    use crate::domain::config::BusinessHoursConfig;
    use crate::domain::types::{GenerationRequest, TrackingStatus};
    use async_trait::async_trait;
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use tokio::time::Instant;

    const CONFIG: &str = r#"
services:
  customers:
    url: http://localhost:3000/api/workflow/customers
  generator:
    endpoint: http://localhost:3000/api/workflow/generate-text
  gateway:
    url: http://localhost:3000/api/workflow/send-message
pacing:
  interval_secs: 10
  jitter_min_secs: 1
  jitter_max_secs: 5
business_hours:
  enabled: false
message:
  template: "Hello {{NAME}} ({{ATTRIBUTE}})"
"#;

    fn config(extra: &str) -> AppConfig {
        AppConfig::from_yaml(&format!("{CONFIG}{extra}")).unwrap()
    }

    fn customers(n: usize) -> Vec<Customer> {
        (1..=n)
            .map(|i| Customer::new(format!("{i}@c.us"), format!("Customer {i}"), "Industry: Retail"))
            .collect()
    }

    struct StaticSource(Result<Vec<Customer>, String>);

    #[async_trait]
    impl CustomerSource for StaticSource {
        async fn fetch(&self) -> Result<Vec<Customer>, String> {
            self.0.clone()
        }
    }

    /// Fails generation for the listed customer names.
    #[derive(Default)]
    struct ScriptedGenerator {
        fail_for: Vec<String>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, String> {
            *self.calls.lock().unwrap() += 1;
            if self.fail_for.iter().any(|name| request.prompt.contains(name.as_str())) {
                return Err("model unavailable".to_string());
            }
            Ok(format!("Message: {}", request.prompt))
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        fail_for: Vec<String>,
        sent: Mutex<Vec<(String, String, DateTime<Utc>)>>,
        clock: Option<Arc<VirtualClock>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, platform: &str, chat_id: &str, _message: &str) -> Result<(), String> {
            if self.fail_for.iter().any(|id| id == chat_id) {
                return Err("gateway rejected".to_string());
            }
            let at = self.clock.as_ref().map(|c| c.now_utc()).unwrap_or_else(Utc::now);
            self.sent
                .lock()
                .unwrap()
                .push((platform.to_string(), chat_id.to_string(), at));
            Ok(())
        }
    }

    /// Reads the saved cursor at the moment each message goes out.
    struct CheckpointReadingSender {
        store: CheckpointStore,
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl MessageSender for CheckpointReadingSender {
        async fn send(&self, _platform: &str, _chat_id: &str, _message: &str) -> Result<(), String> {
            self.seen.lock().unwrap().push(self.store.load().cursor);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryTracker {
        fail: bool,
        records: Mutex<Vec<TrackingRecord>>,
    }

    #[async_trait]
    impl Tracker for MemoryTracker {
        async fn record(&self, record: &TrackingRecord) -> Result<(), String> {
            self.records.lock().unwrap().push(record.clone());
            if self.fail {
                return Err("disk full".to_string());
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        messages: Mutex<Vec<(StatusLevel, String)>>,
    }

    impl RecordingObserver {
        fn messages(&self) -> Vec<(StatusLevel, String)> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl StatusObserver for RecordingObserver {
        fn notify(&self, level: StatusLevel, message: &str) {
            self.messages.lock().unwrap().push((level, message.to_string()));
        }
    }

    /// Wall clock that follows tokio's (paused) virtual time.
    struct VirtualClock {
        base: DateTime<Utc>,
        started: Instant,
    }

    impl VirtualClock {
        fn at(base: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                base,
                started: Instant::now(),
            })
        }
    }

    impl Clock for VirtualClock {
        fn now_utc(&self) -> DateTime<Utc> {
            let elapsed = chrono::TimeDelta::from_std(self.started.elapsed()).unwrap();
            self.base + elapsed
        }

        fn offset(&self) -> FixedOffset {
            FixedOffset::east_opt(8 * 3600).unwrap()
        }
    }

    struct Harness {
        source: Arc<StaticSource>,
        generator: Arc<ScriptedGenerator>,
        sender: Arc<RecordingSender>,
        tracker: Arc<MemoryTracker>,
        observer: Arc<RecordingObserver>,
        clock: Arc<VirtualClock>,
    }

    impl Harness {
        fn new(list: Result<Vec<Customer>, String>) -> Self {
            let clock = VirtualClock::at(Utc.with_ymd_and_hms(2024, 3, 18, 2, 0, 0).unwrap());
            Self {
                source: Arc::new(StaticSource(list)),
                generator: Arc::new(ScriptedGenerator::default()),
                sender: Arc::new(RecordingSender {
                    clock: Some(clock.clone()),
                    ..Default::default()
                }),
                tracker: Arc::new(MemoryTracker::default()),
                observer: Arc::new(RecordingObserver::default()),
                clock,
            }
        }

        fn dispatcher(&self, config: &AppConfig, store: CheckpointStore, stop: StopSignal) -> Dispatcher {
            let collaborators = Collaborators {
                source: self.source.clone(),
                generator: self.generator.clone(),
                sender: self.sender.clone(),
                tracker: self.tracker.clone(),
                observer: self.observer.clone(),
                clock: self.clock.clone(),
            };
            Dispatcher::new(config, collaborators, store, stop)
        }

        fn records(&self) -> Vec<TrackingRecord> {
            self.tracker.records.lock().unwrap().clone()
        }

        fn sent_ids(&self) -> Vec<String> {
            self.sender
                .sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, id, _)| id.clone())
                .collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_reaches_done() {
        let h = Harness::new(Ok(customers(3)));
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.state, DispatchState::Done);
        assert_eq!(dispatcher.state(), DispatchState::Done);
        assert_eq!((summary.attempted, summary.sent, summary.failed), (3, 3, 0));
        assert_eq!(h.sent_ids(), vec!["1@c.us", "2@c.us", "3@c.us"]);
        assert!(h.sender.sent.lock().unwrap().iter().all(|(p, _, _)| p == "whatsapp"));

        let records = h.records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.status == TrackingStatus::Sent));
        assert_eq!(records[0].message, "Message: Hello Customer 1 (Retail)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_reported_in_order() {
        let h = Harness::new(Ok(customers(4)));
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());
        dispatcher.run(false).await.unwrap();

        let processing: Vec<String> = h
            .observer
            .messages()
            .into_iter()
            .map(|(_, m)| m)
            .filter(|m| m.starts_with("Processing"))
            .collect();
        assert_eq!(
            processing,
            vec!["Processing 1/4", "Processing 2/4", "Processing 3/4", "Processing 4/4"]
        );
        assert_eq!(dispatcher.cursor(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_failure_is_isolated() {
        let mut h = Harness::new(Ok(customers(5)));
        h.generator = Arc::new(ScriptedGenerator {
            fail_for: vec!["Customer 3".to_string()],
            ..Default::default()
        });
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.state, DispatchState::Done);
        assert_eq!(*h.generator.calls.lock().unwrap(), 5);

        let records = h.records();
        assert_eq!(records.len(), 5);
        let failed: Vec<_> = records
            .iter()
            .filter(|r| r.status == TrackingStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].customer_id, "3@c.us");
        assert_eq!(h.sent_ids().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_is_tracked_with_text() {
        let mut h = Harness::new(Ok(customers(2)));
        h.sender = Arc::new(RecordingSender {
            fail_for: vec!["1@c.us".to_string()],
            ..Default::default()
        });
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!((summary.sent, summary.failed), (1, 1));
        let records = h.records();
        assert_eq!(records[0].status, TrackingStatus::Failed);
        assert!(!records[0].message.is_empty());
        assert_eq!(records[1].status, TrackingStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracking_failure_does_not_block() {
        let mut h = Harness::new(Ok(customers(3)));
        h.tracker = Arc::new(MemoryTracker {
            fail: true,
            ..Default::default()
        });
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.sent, 3);
        let warnings = h
            .observer
            .messages()
            .into_iter()
            .filter(|(level, m)| *level == StatusLevel::Warn && m.starts_with("Tracking write failed"))
            .count();
        assert_eq!(warnings, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_list_completes_immediately() {
        let h = Harness::new(Ok(Vec::new()));
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.state, DispatchState::Done);
        assert_eq!(summary.attempted, 0);
        assert_eq!(*h.generator.calls.lock().unwrap(), 0);
        assert!(h.records().is_empty());
        assert!(h
            .observer
            .messages()
            .iter()
            .any(|(level, m)| *level == StatusLevel::Warn && m.starts_with("Customer list is empty")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_failure_aborts_to_idle() {
        let h = Harness::new(Err("HTTP 502".to_string()));
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());

        let err = dispatcher.run(false).await.unwrap_err();
        assert_eq!(err, DispatchError::SourceUnavailable("HTTP 502".to_string()));
        assert_eq!(dispatcher.state(), DispatchState::Idle);
        assert_eq!(*h.generator.calls.lock().unwrap(), 0);
        assert!(h.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_paced() {
        let h = Harness::new(Ok(customers(4)));
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());
        dispatcher.run(false).await.unwrap();

        let sent = h.sender.sent.lock().unwrap().clone();
        for pair in sent.windows(2) {
            let gap = (pair[1].2 - pair[0].2).to_std().unwrap();
            assert!(gap >= Duration::from_secs(10), "gap {gap:?} below interval");
            assert!(gap <= Duration::from_secs(16), "gap {gap:?} above interval + jitter");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_business_hours_without_skipping() {
        let mut h = Harness::new(Ok(customers(2)));
        // Friday 23:30 UTC = Saturday 07:30 in UTC+8.
        let clock = VirtualClock::at(Utc.with_ymd_and_hms(2024, 3, 15, 23, 30, 0).unwrap());
        h.clock = clock.clone();
        h.sender = Arc::new(RecordingSender {
            clock: Some(clock),
            ..Default::default()
        });
        let mut cfg = config("");
        cfg.business_hours = BusinessHoursConfig::default();
        let mut dispatcher = h.dispatcher(&cfg, CheckpointStore::disabled(), never_stop());

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(h.sent_ids(), vec!["1@c.us", "2@c.us"]);

        let monday_open = Utc.with_ymd_and_hms(2024, 3, 18, 1, 0, 0).unwrap();
        let first_send = h.sender.sent.lock().unwrap()[0].2;
        assert!(first_send >= monday_open);
        assert!(first_send <= monday_open + chrono::TimeDelta::seconds(10));
        assert!(h
            .observer
            .messages()
            .iter()
            .any(|(_, m)| m == "Waiting 49h 30m for business hours"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_past_closing_waits_for_next_day() {
        let mut h = Harness::new(Ok(customers(1)));
        // Monday 17:59:55 in UTC+8.
        let clock = VirtualClock::at(Utc.with_ymd_and_hms(2024, 3, 18, 9, 59, 55).unwrap());
        h.clock = clock.clone();
        h.sender = Arc::new(RecordingSender {
            clock: Some(clock),
            ..Default::default()
        });
        let mut cfg = config("");
        cfg.business_hours = BusinessHoursConfig::default();
        cfg.pacing.jitter_min_secs = 10;
        cfg.pacing.jitter_max_secs = 10;
        let mut dispatcher = h.dispatcher(&cfg, CheckpointStore::disabled(), never_stop());

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.sent, 1);

        // Tuesday 09:00 in UTC+8.
        let tuesday_open = Utc.with_ymd_and_hms(2024, 3, 19, 1, 0, 0).unwrap();
        let sent_at = h.sender.sent.lock().unwrap()[0].2;
        assert!(sent_at >= tuesday_open, "sent at {sent_at} before opening");
        assert!(h
            .observer
            .messages()
            .iter()
            .any(|(_, m)| m == "Waiting 15h 0m for business hours"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_hours_wait_keeps_cursor() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let mut h = Harness::new(Ok(customers(3)));
        h.clock = VirtualClock::at(Utc.with_ymd_and_hms(2024, 3, 16, 4, 0, 0).unwrap());
        let mut cfg = config("");
        cfg.business_hours = BusinessHoursConfig::default();

        let (tx, rx) = watch::channel(false);
        let mut dispatcher = h.dispatcher(&cfg, store.clone(), rx);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            let _ = tx.send(true);
        });

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.state, DispatchState::Idle);
        assert_eq!(summary.attempted, 0);
        assert_eq!(dispatcher.cursor(), 0);
        assert_eq!(store.load().customer_ids.len(), 3);
        assert_eq!(store.load().cursor, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_attempted_recipients() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        store
            .save(&RunCheckpoint {
                customer_ids: customers(5).into_iter().map(|c| c.id).collect(),
                cursor: 2,
                last_grant_at: None,
            })
            .unwrap();

        let h = Harness::new(Ok(customers(5)));
        let mut dispatcher = h.dispatcher(&config(""), store.clone(), never_stop());
        let summary = dispatcher.run(true).await.unwrap();

        assert_eq!(summary.attempted, 3);
        assert_eq!(h.sent_ids(), vec!["3@c.us", "4@c.us", "5@c.us"]);
        let after = store.load();
        assert!(after.customer_ids.is_empty());
        assert!(after.last_grant_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_is_saved_before_sending() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let h = Harness::new(Ok(customers(3)));
        let sender = Arc::new(CheckpointReadingSender {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let collaborators = Collaborators {
            source: h.source.clone(),
            generator: h.generator.clone(),
            sender: sender.clone(),
            tracker: h.tracker.clone(),
            observer: h.observer.clone(),
            clock: h.clock.clone(),
        };
        let mut dispatcher = Dispatcher::new(&config(""), collaborators, store, never_stop());

        dispatcher.run(false).await.unwrap();
        // Each in-flight recipient is already past the saved cursor.
        assert_eq!(*sender.seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_with_different_list_restarts() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        store
            .save(&RunCheckpoint {
                customer_ids: vec!["other@c.us".to_string()],
                cursor: 1,
                last_grant_at: None,
            })
            .unwrap();

        let h = Harness::new(Ok(customers(2)));
        let mut dispatcher = h.dispatcher(&config(""), store, never_stop());
        let summary = dispatcher.run(true).await.unwrap();
        assert_eq!(summary.attempted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_run_honours_previous_grant() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let h = Harness::new(Ok(customers(1)));
        // Previous process granted a turn 4s ago.
        store
            .save(&RunCheckpoint {
                last_grant_at: Some(h.clock.now_utc() - chrono::TimeDelta::seconds(4)),
                ..Default::default()
            })
            .unwrap();

        let mut dispatcher = h.dispatcher(&config(""), store, never_stop());
        let start = h.clock.now_utc();
        dispatcher.run(false).await.unwrap();

        let sent_at = h.sender.sent.lock().unwrap()[0].2;
        // 6s left of the interval plus at least 1s of jitter.
        assert!(sent_at - start >= chrono::TimeDelta::seconds(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_later_requeues_failed_recipient() {
        let mut h = Harness::new(Ok(customers(3)));
        h.sender = Arc::new(RecordingSender {
            fail_for: vec!["2@c.us".to_string()],
            ..Default::default()
        });
        let cfg = config("policy:\n  on_failure: retry_later\n  max_retries: 1\n");
        let mut dispatcher = h.dispatcher(&cfg, CheckpointStore::disabled(), never_stop());

        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.state, DispatchState::Done);
        assert_eq!(summary.attempted, 4);
        assert_eq!(dispatcher.cursor(), 4);

        let ids: Vec<String> = h.records().into_iter().map(|r| r.customer_id).collect();
        assert_eq!(ids, vec!["1@c.us", "2@c.us", "3@c.us", "2@c.us"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_policy_never_retries() {
        let mut h = Harness::new(Ok(customers(3)));
        h.sender = Arc::new(RecordingSender {
            fail_for: vec!["2@c.us".to_string()],
            ..Default::default()
        });
        let mut dispatcher = h.dispatcher(&config(""), CheckpointStore::disabled(), never_stop());
        let summary = dispatcher.run(false).await.unwrap();
        assert_eq!(summary.attempted, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_mode_sends_single_customer() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("progress.json"));
        let saved = RunCheckpoint {
            customer_ids: vec!["a".into(), "b".into()],
            cursor: 1,
            last_grant_at: None,
        };
        store.save(&saved).unwrap();

        let h = Harness::new(Err("must not be called".to_string()));
        let mut dispatcher = h.dispatcher(&config(""), store.clone(), never_stop());
        let summary = dispatcher
            .run_test(Customer::new("85290897701@c.us", "Test User", "Testing the system"))
            .await;

        assert_eq!(summary.state, DispatchState::Done);
        assert_eq!(h.sent_ids(), vec!["85290897701@c.us"]);
        assert_eq!(h.records().len(), 1);
        let after = store.load();
        assert_eq!(after.customer_ids, saved.customer_ids);
        assert_eq!(after.cursor, 1);
    }
}
