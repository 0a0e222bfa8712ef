use super::*;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::{CatalogResponse, ValidationRequest, VALIDATION_FAILED_REASON};
use tokio::sync::oneshot;

use crate::test_support::{deep_reef, numbered_species, shallow_reef, shared_species};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

struct FixedCatalog(Vec<Species>);

#[async_trait]
impl CatalogSource for FixedCatalog {
    async fn fetch_catalog(&self) -> Result<CatalogResponse> {
        Ok(CatalogResponse {
            count: self.0.len(),
            species: self.0.clone(),
        })
    }
}

struct PendingCheck {
    request: ValidationRequest,
    responder: Option<oneshot::Sender<Result<ValidationResult>>>,
}

/// Holds every check open until the test answers it.
#[derive(Default)]
struct ControlledChecker {
    checks: Mutex<Vec<PendingCheck>>,
}

impl ControlledChecker {
    async fn issued(&self) -> usize {
        self.checks.lock().await.len()
    }

    async fn wait_for_checks(&self, count: usize) {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while self.issued().await < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("consistency checks were not issued");
    }

    async fn request(&self, idx: usize) -> ValidationRequest {
        self.checks.lock().await[idx].request.clone()
    }

    async fn respond(&self, idx: usize, outcome: Result<ValidationResult>) {
        let responder = self.checks.lock().await[idx]
            .responder
            .take()
            .expect("check already answered");
        let _ = responder.send(outcome);
    }
}

#[async_trait]
impl ConsistencyChecker for ControlledChecker {
    async fn check(&self, request: &ValidationRequest) -> Result<ValidationResult> {
        let (tx, rx) = oneshot::channel();
        self.checks.lock().await.push(PendingCheck {
            request: request.clone(),
            responder: Some(tx),
        });
        rx.await.map_err(|_| anyhow!("checker dropped the request"))?
    }
}

#[derive(Default)]
struct RecordingSink {
    fail: bool,
    attempts: Mutex<Vec<Vec<TelemetryEvent>>>,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            fail: true,
            attempts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn send_batch(&self, events: &[TelemetryEvent]) -> Result<()> {
        self.attempts.lock().await.push(events.to_vec());
        if self.fail {
            return Err(anyhow!("telemetry endpoint returned 500"));
        }
        Ok(())
    }
}

struct Harness {
    store: Arc<EcosystemStore>,
    checker: Arc<ControlledChecker>,
    sink: Arc<RecordingSink>,
    events: broadcast::Receiver<StoreEvent>,
}

fn harness_with(catalog: Vec<Species>, sink: RecordingSink, config: SessionConfig) -> Harness {
    let checker = Arc::new(ControlledChecker::default());
    let sink = Arc::new(sink);
    let store = EcosystemStore::new_with_dependencies(
        config,
        Arc::new(FixedCatalog(catalog)),
        checker.clone(),
        sink.clone(),
    );
    let events = store.subscribe();
    Harness {
        store,
        checker,
        sink,
        events,
    }
}

fn harness() -> Harness {
    harness_with(
        numbered_species(3),
        RecordingSink::default(),
        SessionConfig::default(),
    )
}

async fn wait_for_event<F>(events: &mut broadcast::Receiver<StoreEvent>, wanted: F) -> StoreEvent
where
    F: Fn(&StoreEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(err) => panic!("store event channel closed: {err}"),
            }
        }
    })
    .await
    .expect("timed out waiting for store event")
}

async fn wait_for_resolution(events: &mut broadcast::Receiver<StoreEvent>) -> StoreEvent {
    wait_for_event(events, |event| {
        matches!(
            event,
            StoreEvent::ValidationApplied { .. } | StoreEvent::ValidationDiscarded { .. }
        )
    })
    .await
}

async fn fill_selection(store: &Arc<EcosystemStore>, prefix: &str) {
    for n in 0..crate::selection::SELECTION_CAPACITY {
        store.add_species(shared_species(&format!("{prefix}-{n}"))).await;
    }
}

#[tokio::test]
async fn assembling_eight_species_with_environment_issues_one_check() {
    let mut h = harness();
    assert_eq!(h.store.load_catalog().await.expect("catalog"), 3);

    for n in 1..=3 {
        assert!(h.store.add_species_by_name(&format!("species-{n}")).await);
    }
    h.store.set_environment(shallow_reef()).await;

    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.selection.len(), 3);
    assert_eq!(snapshot.gate_phase, GatePhase::Idle);
    assert!(snapshot.validation.is_none());
    assert_eq!(h.checker.issued().await, 0);

    for name in ["Kelp", "Sea Urchin", "Sea Otter", "Grouper", "Parrotfish"] {
        assert!(h.store.add_species(shared_species(name)).await);
    }
    h.checker.wait_for_checks(1).await;
    assert_eq!(h.store.snapshot().await.gate_phase, GatePhase::Pending);

    let request = h.checker.request(0).await;
    assert_eq!(request.species.len(), 8);
    assert_eq!(request.species[0].name, "species-1");
    assert_eq!(request.species[7].name, "Parrotfish");
    assert_eq!(request.location, shallow_reef());

    h.checker.respond(0, Ok(ValidationResult::valid())).await;
    let resolution = wait_for_resolution(&mut h.events).await;
    assert!(matches!(
        resolution,
        StoreEvent::ValidationApplied { valid: true, .. }
    ));

    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.validation, Some(ValidationResult::valid()));
    assert_eq!(snapshot.gate_phase, GatePhase::Resolved { valid: true });
    assert_eq!(snapshot.checks_in_flight, 0);
    assert_eq!(h.checker.issued().await, 1);
}

#[tokio::test]
async fn no_op_intents_record_nothing_and_trigger_no_check() {
    let h = harness();
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    h.checker.wait_for_checks(1).await;

    let before = h.store.snapshot().await;
    assert!(!h.store.add_species(shared_species("s-0")).await);
    assert!(!h.store.add_species(shared_species("ninth")).await);
    assert!(!h.store.remove_species("never-added").await);
    assert!(!h.store.add_species_by_name("not-in-catalog").await);

    let after = h.store.snapshot().await;
    assert_eq!(after.selection, before.selection);
    assert_eq!(after.pending_telemetry, before.pending_telemetry);
    assert_eq!(h.checker.issued().await, 1);
}

#[tokio::test]
async fn every_successful_mutation_appends_telemetry() {
    let h = harness();
    h.store.add_species(shared_species("Kelp")).await;
    h.store.set_environment(deep_reef()).await;
    h.store.remove_species("Kelp").await;

    assert_eq!(h.store.snapshot().await.pending_telemetry, 3);
    assert_eq!(h.store.flush_telemetry().await, 3);

    let attempts = h.sink.attempts.lock().await;
    let kinds: Vec<_> = attempts[0].iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TelemetryEventKind::SpeciesSelect,
            TelemetryEventKind::LocationChange,
            TelemetryEventKind::SpeciesRemove,
        ]
    );
    assert_eq!(
        attempts[0][0].data,
        Some(serde_json::json!({ "species": "Kelp" }))
    );
    assert_eq!(
        attempts[0][1].data.as_ref().map(|data| &data["depth"]),
        Some(&serde_json::json!(35))
    );
}

#[tokio::test]
async fn breaking_the_gate_condition_clears_result_without_waiting() {
    let mut h = harness();
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    h.checker.wait_for_checks(1).await;
    h.checker.respond(0, Ok(ValidationResult::valid())).await;
    wait_for_resolution(&mut h.events).await;
    assert!(h.store.snapshot().await.validation.is_some());

    h.store.remove_species("s-4").await;
    let snapshot = h.store.snapshot().await;
    assert!(snapshot.validation.is_none());
    assert_eq!(snapshot.gate_phase, GatePhase::Idle);
}

#[tokio::test]
async fn response_for_a_replaced_selection_is_never_applied() {
    let mut h = harness();
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    h.checker.wait_for_checks(1).await;

    h.store.remove_species("s-7").await;
    h.store.add_species(shared_species("replacement")).await;
    h.checker.wait_for_checks(2).await;
    assert_eq!(h.store.snapshot().await.checks_in_flight, 2);

    h.checker
        .respond(0, Ok(ValidationResult::invalid("No sustainable food chain found")))
        .await;
    let first = wait_for_resolution(&mut h.events).await;
    assert!(matches!(first, StoreEvent::ValidationDiscarded { .. }));
    let snapshot = h.store.snapshot().await;
    assert!(snapshot.validation.is_none());
    assert_eq!(snapshot.gate_phase, GatePhase::Pending);

    h.checker.respond(1, Ok(ValidationResult::valid())).await;
    let second = wait_for_resolution(&mut h.events).await;
    assert!(matches!(second, StoreEvent::ValidationApplied { valid: true, .. }));
    assert_eq!(
        h.store.snapshot().await.validation,
        Some(ValidationResult::valid())
    );
}

#[tokio::test]
async fn out_of_order_responses_keep_the_newest_result() {
    let mut h = harness();
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    h.checker.wait_for_checks(1).await;

    h.store.set_environment(deep_reef()).await;
    h.checker.wait_for_checks(2).await;
    assert_eq!(h.checker.request(1).await.location, deep_reef());

    h.checker
        .respond(1, Ok(ValidationResult::invalid("too deep")))
        .await;
    wait_for_resolution(&mut h.events).await;
    h.checker.respond(0, Ok(ValidationResult::valid())).await;
    let late = wait_for_resolution(&mut h.events).await;
    assert!(matches!(late, StoreEvent::ValidationDiscarded { .. }));

    let validation = h.store.snapshot().await.validation.expect("result");
    assert!(!validation.valid);
    assert_eq!(validation.reason.as_deref(), Some("too deep"));
}

#[tokio::test]
async fn identical_selection_restored_mid_flight_discards_old_response() {
    let mut h = harness();
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    h.checker.wait_for_checks(1).await;

    h.store.remove_species("s-0").await;
    h.store.add_species(shared_species("s-0")).await;
    h.checker.wait_for_checks(2).await;

    h.checker
        .respond(0, Ok(ValidationResult::invalid("stale verdict")))
        .await;
    let first = wait_for_resolution(&mut h.events).await;
    assert!(matches!(first, StoreEvent::ValidationDiscarded { .. }));
    assert!(h.store.snapshot().await.validation.is_none());
}

#[tokio::test]
async fn failed_check_yields_validation_failed_result() {
    let mut h = harness();
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    h.checker.wait_for_checks(1).await;

    h.checker
        .respond(0, Err(anyhow!("connection reset by peer")))
        .await;
    let resolution = wait_for_resolution(&mut h.events).await;
    assert!(matches!(
        resolution,
        StoreEvent::ValidationApplied { valid: false, .. }
    ));

    let snapshot = h.store.snapshot().await;
    let validation = snapshot.validation.expect("result");
    assert!(!validation.valid);
    assert_eq!(validation.reason.as_deref(), Some(VALIDATION_FAILED_REASON));
    assert_eq!(snapshot.gate_phase, GatePhase::Resolved { valid: false });
}

#[tokio::test]
async fn failed_flush_drops_the_batch_without_resending() {
    let h = harness_with(
        numbered_species(3),
        RecordingSink::failing(),
        SessionConfig::default(),
    );
    h.store
        .record_event(TelemetryEventKind::Click, Some(serde_json::json!({ "x": 4 })))
        .await;
    h.store.record_event(TelemetryEventKind::MouseMove, None).await;

    assert_eq!(h.store.flush_telemetry().await, 2);
    assert_eq!(h.store.snapshot().await.pending_telemetry, 0);
    assert_eq!(h.store.flush_telemetry().await, 0);

    let attempts = h.sink.attempts.lock().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].len(), 2);
}

#[tokio::test]
async fn empty_buffer_is_not_sent() {
    let h = harness();
    assert_eq!(h.store.flush_telemetry().await, 0);
    assert!(h.sink.attempts.lock().await.is_empty());
}

#[tokio::test]
async fn clock_floors_at_zero_and_reports_expiry_once() {
    let mut h = harness_with(
        Vec::new(),
        RecordingSink::default(),
        SessionConfig {
            session_seconds: 2,
            ..SessionConfig::default()
        },
    );
    assert_eq!(h.store.tick_clock().await, 1);
    assert_eq!(h.store.tick_clock().await, 0);
    assert_eq!(h.store.tick_clock().await, 0);
    assert_eq!(h.store.snapshot().await.seconds_remaining, 0);

    let mut expirations = 0;
    while let Ok(event) = h.events.try_recv() {
        if event == StoreEvent::SessionExpired {
            expirations += 1;
        }
    }
    assert_eq!(expirations, 1);
}

#[tokio::test]
async fn catalog_failure_is_non_fatal() {
    let checker = Arc::new(ControlledChecker::default());
    let store = EcosystemStore::new_with_dependencies(
        SessionConfig::default(),
        Arc::new(crate::MissingCatalogSource),
        checker,
        Arc::new(RecordingSink::default()),
    );

    assert!(store.load_catalog().await.is_err());
    assert!(store.snapshot().await.catalog.is_empty());
    assert!(!store.add_species_by_name("species-1").await);
    assert!(store.add_species(shared_species("Kelp")).await);
}

#[tokio::test]
async fn catalog_is_loaded_once() {
    let h = harness();
    assert_eq!(h.store.load_catalog().await.expect("first"), 3);
    assert_eq!(h.store.load_catalog().await.expect("second"), 3);
    assert_eq!(h.store.snapshot().await.catalog.len(), 3);
}

#[tokio::test]
async fn reset_session_restores_initial_state_but_keeps_telemetry() {
    let mut h = harness_with(
        numbered_species(3),
        RecordingSink::default(),
        SessionConfig {
            session_seconds: 60,
            ..SessionConfig::default()
        },
    );
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    h.checker.wait_for_checks(1).await;
    h.store.tick_clock().await;

    h.store.reset_session().await;
    let snapshot = h.store.snapshot().await;
    assert!(snapshot.selection.is_empty());
    assert!(snapshot.environment.is_none());
    assert!(snapshot.validation.is_none());
    assert_eq!(snapshot.gate_phase, GatePhase::Idle);
    assert_eq!(snapshot.seconds_remaining, 60);
    assert_eq!(snapshot.pending_telemetry, 9);

    h.checker.respond(0, Ok(ValidationResult::valid())).await;
    let late = wait_for_resolution(&mut h.events).await;
    assert!(matches!(late, StoreEvent::ValidationDiscarded { .. }));
    assert!(h.store.snapshot().await.validation.is_none());
}

#[tokio::test]
async fn cadences_tick_and_flush_until_shutdown() {
    let mut h = harness_with(
        Vec::new(),
        RecordingSink::default(),
        SessionConfig {
            session_seconds: 1000,
            clock_tick: Duration::from_millis(10),
            telemetry_flush_interval: Duration::from_millis(25),
        },
    );
    h.store.start().await;
    h.store.start().await;
    h.store.record_event(TelemetryEventKind::Click, None).await;

    wait_for_event(&mut h.events, |event| {
        matches!(event, StoreEvent::TelemetryFlushed { count: 1, delivered: true })
    })
    .await;
    wait_for_event(&mut h.events, |event| {
        matches!(event, StoreEvent::ClockTicked { .. })
    })
    .await;

    h.store.shutdown().await;
    let after_shutdown = h.store.snapshot().await;
    assert!(after_shutdown.seconds_remaining < 1000);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        h.store.snapshot().await.seconds_remaining,
        after_shutdown.seconds_remaining
    );
    assert_eq!(h.sink.attempts.lock().await.len(), 1);
}

#[tokio::test]
async fn shutdown_flushes_what_is_pending() {
    let h = harness();
    h.store.add_species(shared_species("Kelp")).await;
    h.store.shutdown().await;
    h.store.shutdown().await;

    assert_eq!(h.store.snapshot().await.pending_telemetry, 0);
    let attempts = h.sink.attempts.lock().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0][0].kind, TelemetryEventKind::SpeciesSelect);
}

#[tokio::test]
async fn no_checks_are_issued_after_shutdown() {
    let h = harness();
    h.store.shutdown().await;
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.checker.issued().await, 0);

    let snapshot = h.store.snapshot().await;
    assert_ne!(snapshot.gate_phase, GatePhase::Pending);
    assert_eq!(snapshot.checks_in_flight, 0);
}

#[tokio::test]
async fn shutdown_releases_a_check_in_flight() {
    let h = harness();
    h.store.set_environment(shallow_reef()).await;
    fill_selection(&h.store, "s").await;
    h.checker.wait_for_checks(1).await;
    assert_eq!(h.store.snapshot().await.gate_phase, GatePhase::Pending);

    h.store.shutdown().await;

    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.gate_phase, GatePhase::Idle);
    assert_eq!(snapshot.checks_in_flight, 0);
    assert!(snapshot.validation.is_none());
}
