//! The single owner of session state and the only mutation entry point for
//! the presentation layer.

use std::sync::{Arc, Weak};

use serde_json::Value;
use shared::{
    domain::{Environment, Species},
    protocol::{TelemetryEvent, TelemetryEventKind, ValidationResult},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::{JoinHandle, JoinSet},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    catalog::CatalogCache,
    clock::SessionClock,
    error::{CatalogLoadError, TelemetrySendError, ValidationRequestError},
    gate::{CheckTicket, GatePhase, Resolution, ValidationGate},
    selection::SelectionSet,
    telemetry::TelemetryBatcher,
    CatalogSource, ConsistencyChecker, MissingCatalogSource, MissingConsistencyChecker,
    MissingTelemetrySink, SessionConfig, TelemetrySink,
};

/// Notifications for the presentation layer; re-render from
/// [`EcosystemStore::snapshot`] on receipt.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    CatalogLoaded { count: usize },
    CatalogUnavailable,
    SelectionChanged { size: usize },
    EnvironmentChanged(Environment),
    SessionReset,
    ValidationIssued { generation: u64 },
    ValidationApplied { generation: u64, valid: bool },
    ValidationDiscarded { generation: u64 },
    TelemetryFlushed { count: usize, delivered: bool },
    ClockTicked { remaining: u32 },
    SessionExpired,
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub catalog: Vec<Arc<Species>>,
    pub selection: Vec<Arc<Species>>,
    pub environment: Option<Environment>,
    pub validation: Option<ValidationResult>,
    pub gate_phase: GatePhase,
    pub checks_in_flight: usize,
    pub pending_telemetry: usize,
    pub seconds_remaining: u32,
    pub running_low: bool,
}

struct StoreState {
    catalog: CatalogCache,
    selection: SelectionSet,
    environment: Option<Environment>,
    gate: ValidationGate,
    telemetry: TelemetryBatcher,
    clock: SessionClock,
}

#[derive(Default)]
struct BackgroundTasks {
    cadences: Vec<JoinHandle<()>>,
    checks: JoinSet<()>,
    shut_down: bool,
}

pub struct EcosystemStore {
    catalog_source: Arc<dyn CatalogSource>,
    checker: Arc<dyn ConsistencyChecker>,
    telemetry_sink: Arc<dyn TelemetrySink>,
    config: SessionConfig,
    inner: Mutex<StoreState>,
    tasks: Mutex<BackgroundTasks>,
    events: broadcast::Sender<StoreEvent>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl EcosystemStore {
    pub fn new(config: SessionConfig) -> Arc<Self> {
        Self::new_with_dependencies(
            config,
            Arc::new(MissingCatalogSource),
            Arc::new(MissingConsistencyChecker),
            Arc::new(MissingTelemetrySink),
        )
    }

    /// Uses one backend for all three collaborators.
    pub fn with_backend<B>(config: SessionConfig, backend: Arc<B>) -> Arc<Self>
    where
        B: CatalogSource + ConsistencyChecker + TelemetrySink + 'static,
    {
        Self::new_with_dependencies(config, backend.clone(), backend.clone(), backend)
    }

    pub fn new_with_dependencies(
        config: SessionConfig,
        catalog_source: Arc<dyn CatalogSource>,
        checker: Arc<dyn ConsistencyChecker>,
        telemetry_sink: Arc<dyn TelemetrySink>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let clock = SessionClock::new(config.session_seconds);
        Arc::new(Self {
            catalog_source,
            checker,
            telemetry_sink,
            config,
            inner: Mutex::new(StoreState {
                catalog: CatalogCache::new(),
                selection: SelectionSet::new(),
                environment: None,
                gate: ValidationGate::new(),
                telemetry: TelemetryBatcher::new(),
                clock,
            }),
            tasks: Mutex::new(BackgroundTasks::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Loads the catalog once. A failure leaves the catalog empty and the
    /// session usable.
    pub async fn load_catalog(&self) -> Result<usize, CatalogLoadError> {
        {
            let state = self.inner.lock().await;
            if state.catalog.is_loaded() {
                debug!("catalog: already loaded, skipping fetch");
                return Ok(state.catalog.len());
            }
        }

        let mut fresh = CatalogCache::new();
        let count = match fresh.load(self.catalog_source.as_ref()).await {
            Ok(count) => count,
            Err(err) => {
                warn!("catalog: {err}; continuing with an empty catalog");
                let _ = self.events.send(StoreEvent::CatalogUnavailable);
                return Err(err);
            }
        };

        self.inner.lock().await.catalog = fresh;
        let _ = self.events.send(StoreEvent::CatalogLoaded { count });
        Ok(count)
    }

    /// Adds the catalog entry called `name`. Unknown names are ignored.
    pub async fn add_species_by_name(self: &Arc<Self>, name: &str) -> bool {
        let Some(species) = self.inner.lock().await.catalog.find(name) else {
            debug!("selection: ignoring unknown species name={name}");
            return false;
        };
        self.add_species(species).await
    }

    pub async fn add_species(self: &Arc<Self>, species: Arc<Species>) -> bool {
        self.apply_mutation(move |state| {
            let name = species.name.clone();
            if !state.selection.add(species) {
                debug!("selection: add of {name} ignored");
                return None;
            }
            Some((
                TelemetryEvent::species(TelemetryEventKind::SpeciesSelect, now_millis(), &name),
                StoreEvent::SelectionChanged {
                    size: state.selection.size(),
                },
            ))
        })
        .await
    }

    pub async fn remove_species(self: &Arc<Self>, name: &str) -> bool {
        self.apply_mutation(|state| {
            if !state.selection.remove(name) {
                debug!("selection: remove of {name} ignored");
                return None;
            }
            Some((
                TelemetryEvent::species(TelemetryEventKind::SpeciesRemove, now_millis(), name),
                StoreEvent::SelectionChanged {
                    size: state.selection.size(),
                },
            ))
        })
        .await
    }

    pub async fn set_environment(self: &Arc<Self>, environment: Environment) {
        self.apply_mutation(|state| {
            state.environment = Some(environment);
            Some((
                TelemetryEvent::location(now_millis(), &environment),
                StoreEvent::EnvironmentChanged(environment),
            ))
        })
        .await;
    }

    /// Clears selection and environment and restores the full countdown.
    /// Pending telemetry is kept for the next flush.
    pub async fn reset_session(&self) {
        {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            state.selection.clear();
            state.environment = None;
            state.clock.reset();
            let ticket = state.gate.evaluate(&state.selection, None);
            debug_assert!(ticket.is_none());
        }
        info!("session: reset");
        let _ = self.events.send(StoreEvent::SessionReset);
    }

    pub async fn record_event(&self, kind: TelemetryEventKind, data: Option<Value>) {
        self.record_telemetry(TelemetryEvent::new(kind, now_millis(), data))
            .await;
    }

    pub async fn record_telemetry(&self, event: TelemetryEvent) {
        self.inner.lock().await.telemetry.record(event);
    }

    /// Sends everything pending as one batch. The buffer is emptied before
    /// the send and a failed batch is dropped. Returns the batch size.
    pub async fn flush_telemetry(&self) -> usize {
        let Some(batch) = self.inner.lock().await.telemetry.take_batch() else {
            return 0;
        };
        let count = batch.len();

        let delivered = match self.telemetry_sink.send_batch(&batch).await {
            Ok(()) => {
                info!("telemetry: flushed {count} events");
                true
            }
            Err(source) => {
                let err = TelemetrySendError {
                    batch_len: count,
                    source,
                };
                warn!("telemetry: {err}; batch dropped");
                false
            }
        };
        let _ = self
            .events
            .send(StoreEvent::TelemetryFlushed { count, delivered });
        count
    }

    pub async fn tick_clock(&self) -> u32 {
        let (was_running, remaining) = {
            let mut state = self.inner.lock().await;
            let was_running = !state.clock.is_expired();
            (was_running, state.clock.tick())
        };

        let _ = self.events.send(StoreEvent::ClockTicked { remaining });
        if was_running && remaining == 0 {
            info!("session: time expired");
            let _ = self.events.send(StoreEvent::SessionExpired);
        }
        remaining
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.inner.lock().await;
        StoreSnapshot {
            catalog: state.catalog.all(),
            selection: state.selection.snapshot(),
            environment: state.environment,
            validation: state.gate.result().cloned(),
            gate_phase: state.gate.phase(),
            checks_in_flight: state.gate.in_flight(),
            pending_telemetry: state.telemetry.pending_len(),
            seconds_remaining: state.clock.remaining(),
            running_low: state.clock.is_running_low(),
        }
    }

    /// Spawns the clock and telemetry cadences. Calling it again while they
    /// run is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if tasks.shut_down || !tasks.cadences.is_empty() {
            return;
        }

        let clock_tick = self.config.clock_tick;
        tasks
            .cadences
            .push(spawn_cadence(Arc::downgrade(self), clock_tick, |store| async move {
                store.tick_clock().await;
            }));

        let flush_interval = self.config.telemetry_flush_interval;
        tasks
            .cadences
            .push(spawn_cadence(Arc::downgrade(self), flush_interval, |store| async move {
                store.flush_telemetry().await;
            }));

        info!(
            "session: started clock_tick={clock_tick:?} telemetry_flush={flush_interval:?}"
        );
    }

    /// Cancels both cadences and every outstanding check, then makes one last
    /// best-effort telemetry flush.
    pub async fn shutdown(&self) {
        {
            let mut tasks = self.tasks.lock().await;
            if tasks.shut_down {
                return;
            }
            tasks.shut_down = true;
            for handle in tasks.cadences.drain(..) {
                handle.abort();
            }
            tasks.checks.abort_all();
        }
        self.inner.lock().await.gate.abandon();
        self.flush_telemetry().await;
        info!("session: shut down");
    }

    async fn apply_mutation<F>(self: &Arc<Self>, mutate: F) -> bool
    where
        F: FnOnce(&mut StoreState) -> Option<(TelemetryEvent, StoreEvent)>,
    {
        let (ticket, changed) = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let Some((telemetry, changed)) = mutate(state) else {
                return false;
            };
            state.telemetry.record(telemetry);
            let ticket = state
                .gate
                .evaluate(&state.selection, state.environment.as_ref());
            (ticket, changed)
        };

        let _ = self.events.send(changed);
        if let Some(ticket) = ticket {
            self.dispatch_check(ticket).await;
        }
        true
    }

    async fn dispatch_check(self: &Arc<Self>, ticket: CheckTicket) {
        let generation = ticket.generation;
        let mut tasks = self.tasks.lock().await;
        if tasks.shut_down {
            drop(tasks);
            debug!("gate: store shut down, not issuing generation={generation}");
            self.inner.lock().await.gate.abandon();
            return;
        }
        while tasks.checks.try_join_next().is_some() {}

        info!("gate: issuing consistency check generation={generation}");
        let _ = self.events.send(StoreEvent::ValidationIssued { generation });
        let store = Arc::clone(self);
        tasks.checks.spawn(async move {
            let outcome = store
                .checker
                .check(&ticket.request)
                .await
                .map_err(ValidationRequestError::from);
            store.apply_check_outcome(generation, outcome).await;
        });
    }

    async fn apply_check_outcome(
        &self,
        generation: u64,
        outcome: Result<ValidationResult, ValidationRequestError>,
    ) {
        let resolution = self.inner.lock().await.gate.resolve(generation, outcome);
        match resolution {
            Resolution::Applied { valid } => {
                info!("gate: applied result generation={generation} valid={valid}");
                let _ = self
                    .events
                    .send(StoreEvent::ValidationApplied { generation, valid });
            }
            Resolution::Stale => {
                debug!("gate: discarded stale result generation={generation}");
                let _ = self
                    .events
                    .send(StoreEvent::ValidationDiscarded { generation });
            }
        }
    }
}

fn spawn_cadence<F, Fut>(
    store: Weak<EcosystemStore>,
    period: std::time::Duration,
    mut on_tick: F,
) -> JoinHandle<()>
where
    F: FnMut(Arc<EcosystemStore>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let period = period.max(std::time::Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(store) = store.upgrade() else {
                break;
            };
            on_tick(store).await;
        }
    })
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
