use std::{
    sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock},
    time::Instant,
};

use anyhow::Result;
use chrono::NaiveDate;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    db::{CounterName, DailyCounter, Database, SampleQuery, StoredSample},
    error::{EngineError, EngineResult},
    link::{
        link_loop, DefaultLinkProvider, LatestSample, LinkController, LinkKind, LinkProvider,
        LinkState, Pipeline, SharedPosture,
    },
    live::{BroadcastHub, Listener, ListenerId},
    settings::EngineSettings,
    store::{local_today, CounterStore, SampleStore},
    telemetry::{Sample, SampleSeries},
};

use super::summary::{CounterTotals, PostureSummary};

static GLOBAL: OnceLock<Engine> = OnceLock::new();
static GLOBAL_INIT: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub sample_count: u64,
    pub persistence: bool,
    pub link_state: LinkState,
    /// Kind of link opened by the most recent start, if any.
    pub link: Option<LinkKind>,
    pub simulated: bool,
    pub slouching: bool,
    pub listeners: usize,
}

struct EngineInner {
    settings: EngineSettings,
    provider: Arc<dyn LinkProvider>,
    samples: SampleStore,
    counters: Option<CounterStore>,
    hub: BroadcastHub,
    latest: LatestSample,
    posture: SharedPosture,
    started_at: Instant,
    controller: Mutex<LinkController>,
    link_state: Mutex<watch::Receiver<LinkState>>,
    link_kind: RwLock<Option<LinkKind>>,
}

/// Process-facing handle to the ingestion engine. Cheap to clone; all clones
/// drive the same background loop and stores.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fills `cell` with `make()` at most once. Concurrent callers wait on `init`
/// and never run `make` after another caller has filled the cell. A failed
/// `make` leaves the cell empty for the next caller.
fn init_once<T>(
    cell: &'static OnceLock<T>,
    init: &Mutex<()>,
    make: impl FnOnce() -> Result<T>,
) -> Result<&'static T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let _guard = lock(init);
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = make()?;
    Ok(cell.get_or_init(|| value))
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Result<Self> {
        Self::with_provider(settings, Arc::new(DefaultLinkProvider))
    }

    /// Builds an engine whose loop gets its peer link from `provider`.
    pub fn with_provider(settings: EngineSettings, provider: Arc<dyn LinkProvider>) -> Result<Self> {
        let (samples, counters) = if settings.persist_data {
            let db = Database::new(settings.db_path.clone())?;
            info!("Persisting samples to {}", db.path().display());
            let counters = CounterStore::new(db.clone(), settings.counter_retention_days);
            (SampleStore::Durable(db), Some(counters))
        } else {
            info!("Persistence disabled, keeping samples in memory");
            (SampleStore::memory(settings.memory_log_capacity), None)
        };

        let (_, idle) = watch::channel(LinkState::Idle);
        let hub = BroadcastHub::new(settings.listener_capacity);

        Ok(Self {
            inner: Arc::new(EngineInner {
                settings,
                provider,
                samples,
                counters,
                hub,
                latest: LatestSample::default(),
                posture: SharedPosture::default(),
                started_at: Instant::now(),
                controller: Mutex::new(LinkController::new()),
                link_state: Mutex::new(idle),
                link_kind: RwLock::new(None),
            }),
        })
    }

    /// Creates the process-wide engine on first call; later calls return it
    /// and ignore `settings`.
    pub fn init_global(settings: EngineSettings) -> Result<&'static Engine> {
        init_once(&GLOBAL, &GLOBAL_INIT, || Self::new(settings))
    }

    pub fn global() -> Option<&'static Engine> {
        GLOBAL.get()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn persistence_enabled(&self) -> bool {
        self.inner.counters.is_some()
    }

    // ----- lifecycle -----

    /// Starts the connection loop for `device_name`. Returns `Ok(false)` when
    /// the engine is already running.
    pub fn start(&self, device_name: &str) -> EngineResult<bool> {
        let mut controller = lock(&self.inner.controller);
        if controller.is_running() {
            debug!("start ignored, engine already running");
            return Ok(false);
        }

        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let inner = self.inner.clone();
        let device_name = device_name.to_string();
        info!("Starting engine for {device_name}");

        controller
            .start(move |cancel| async move {
                let link = inner.provider.open(&inner.settings.link).await;
                let kind = link.kind();
                info!("Link selected: {kind:?}");
                *inner
                    .link_kind
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(kind);

                let pipeline = Pipeline::new(
                    inner.posture.clone(),
                    inner.samples.clone(),
                    inner.counters.clone(),
                    inner.hub.clone(),
                    inner.latest.clone(),
                    inner.started_at,
                );
                link_loop(
                    link,
                    device_name,
                    pipeline,
                    inner.settings.link,
                    cancel,
                    state_tx,
                )
                .await;
            })
            .map_err(EngineError::Start)?;

        *lock(&self.inner.link_state) = state_rx;
        Ok(true)
    }

    /// Signals the loop to stop and returns immediately. Returns whether the
    /// engine was running.
    pub fn stop(&self) -> bool {
        let stopped = lock(&self.inner.controller).stop();
        if stopped {
            info!("Stop requested");
        }
        stopped
    }

    /// Resolves once the most recently started loop has exited.
    pub async fn wait_stopped(&self) {
        let finished = lock(&self.inner.controller).finished();
        if let Some(done) = finished {
            done.cancelled().await;
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.controller).is_running()
    }

    pub async fn status(&self) -> EngineStatus {
        let sample_count = self.inner.samples.len().await.unwrap_or_else(|err| {
            error!("Failed to count samples: {err:#}");
            0
        });
        let link = *self
            .inner
            .link_kind
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let link_state = *lock(&self.inner.link_state).borrow();

        EngineStatus {
            running: self.is_running(),
            sample_count,
            persistence: self.persistence_enabled(),
            link_state,
            link,
            simulated: link == Some(LinkKind::Synthetic),
            slouching: self.inner.posture.is_slouching(),
            listeners: self.inner.hub.len(),
        }
    }

    // ----- live feed -----

    pub fn register_listener(&self) -> Listener {
        let listener = self.inner.hub.register();
        debug!("Listener {} registered", listener.id());
        listener
    }

    pub fn register_listener_with_capacity(&self, capacity: usize) -> Listener {
        let listener = self.inner.hub.register_with_capacity(capacity);
        debug!("Listener {} registered (capacity {capacity})", listener.id());
        listener
    }

    /// Idempotent; returns whether the listener was still registered.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let removed = self.inner.hub.unregister(id);
        if removed {
            debug!("Listener {id} unregistered");
        }
        removed
    }

    // ----- samples -----

    pub async fn get_latest(&self) -> EngineResult<Sample> {
        if let Some(sample) = self.inner.latest.get() {
            return Ok(sample);
        }
        match self.inner.samples.latest().await {
            Ok(Some(stored)) => Ok(stored.sample),
            Ok(None) => Err(EngineError::NotFound("sample")),
            Err(err) => {
                error!("Failed to read latest sample: {err:#}");
                Err(EngineError::NotFound("sample"))
            }
        }
    }

    /// Full history in column form, oldest first.
    pub async fn get_data(&self) -> SampleSeries {
        match self.inner.samples.query(SampleQuery::all()).await {
            Ok(rows) => rows.iter().map(|row| &row.sample).collect(),
            Err(err) => {
                error!("Failed to read sample history: {err:#}");
                SampleSeries::default()
            }
        }
    }

    pub async fn query_samples(&self, query: SampleQuery) -> EngineResult<Vec<StoredSample>> {
        self.durable_samples()?;
        Ok(self.inner.samples.query(query).await.unwrap_or_else(|err| {
            error!("Failed to query samples: {err:#}");
            Vec::new()
        }))
    }

    /// Deletes samples older than `older_than_days` and returns how many
    /// went. Storage failures are reported rather than read as zero.
    pub async fn prune_samples(&self, older_than_days: u32) -> EngineResult<u64> {
        self.durable_samples()?;
        let deleted = self
            .inner
            .samples
            .prune_older_than(older_than_days)
            .await
            .map_err(|err| {
                error!("Failed to prune samples: {err:#}");
                EngineError::Storage(err)
            })?;
        info!("Pruned {deleted} samples older than {older_than_days} days");
        Ok(deleted)
    }

    // ----- counters -----

    pub fn parse_counter(name: &str) -> EngineResult<CounterName> {
        name.parse().map_err(|_| EngineError::NotFound("counter"))
    }

    /// Today's value; 0 when the counter has not been touched today.
    pub async fn get_counter(&self, name: CounterName) -> EngineResult<u64> {
        let counters = self.counters()?;
        Ok(counters.get(name, local_today()).await.unwrap_or_else(|err| {
            error!("Failed to read {name}: {err:#}");
            0
        }))
    }

    pub async fn reset_counter(&self, name: CounterName) -> EngineResult<()> {
        let counters = self.counters()?;
        if let Err(err) = counters.reset(name, local_today()).await {
            error!("Failed to reset {name}: {err:#}");
        }
        Ok(())
    }

    pub async fn counter_range_sum(
        &self,
        name: CounterName,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<u64> {
        let counters = self.counters()?;
        Ok(counters.range_sum(name, start, end).await.unwrap_or_else(|err| {
            error!("Failed to sum {name} over {start}..={end}: {err:#}");
            0
        }))
    }

    pub async fn counter_history(
        &self,
        name: CounterName,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<DailyCounter>> {
        let counters = self.counters()?;
        Ok(counters.history(name, start, end).await.unwrap_or_else(|err| {
            error!("Failed to read {name} history: {err:#}");
            Vec::new()
        }))
    }

    /// Today's and all-time counter totals with slouch percentages and ratios.
    pub async fn summary(&self) -> EngineResult<PostureSummary> {
        let counters = self.counters()?;
        let date = local_today();

        let read = |value: Result<u64>, what: &str| {
            value.unwrap_or_else(|err| {
                error!("Failed to read {what} for summary: {err:#}");
                0
            })
        };

        let mut today = CounterTotals::default();
        let mut all_time = CounterTotals::default();
        for name in CounterName::ALL {
            let day_value = read(counters.get(name, date).await, name.as_str());
            let total_value = read(counters.total(name).await, name.as_str());
            let (day_slot, total_slot) = match name {
                CounterName::SlouchFrequency => {
                    (&mut today.slouch_frequency, &mut all_time.slouch_frequency)
                }
                CounterName::SlouchTime => (&mut today.slouch_time, &mut all_time.slouch_time),
                CounterName::StraightTime => {
                    (&mut today.straight_time, &mut all_time.straight_time)
                }
            };
            *day_slot = day_value;
            *total_slot = total_value;
        }

        Ok(PostureSummary {
            date,
            today,
            all_time,
        })
    }

    fn counters(&self) -> EngineResult<&CounterStore> {
        self.inner
            .counters
            .as_ref()
            .ok_or(EngineError::PersistenceDisabled)
    }

    fn durable_samples(&self) -> EngineResult<()> {
        if self.inner.samples.is_durable() {
            Ok(())
        } else {
            Err(EngineError::PersistenceDisabled)
        }
    }
}
