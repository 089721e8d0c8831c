use std::{future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::Client;
use serde::Serialize;
use tokio::{
    sync::RwLock,
    task::JoinSet,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};
use tracing::{debug, error, field, info, instrument, Span};

use crate::{
    required::{load_required, RequiredSet},
    settings::Settings,
    store::KubeStore,
    telemetry,
    trigger::{Action, TryBuffer},
    watchers::{Context, ObservedWatcher, RequiredWatcher, ResourceWatcher},
    Cause, Error, Lifetime, Metrics, Result,
};

/// Where the orchestrator is in its lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[default]
    Initializing,
    StartingWatchers,
    Settling,
    /// Settled, the initial pass has not completed yet
    InitialSync,
    SteadyState,
    ShuttingDown,
    Stopped,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub phase: Phase,
    pub started: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
    pub syncs: u64,
    pub cause: Option<String>,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            phase: Phase::default(),
            started: Utc::now(),
            last_sync: None,
            syncs: 0,
            cause: None,
        }
    }
}

/// State shared between the operator and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the orchestrator
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the operator outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a watcher Context backed by this State's registry
    pub(crate) fn to_context(&self, settings: &Settings) -> Result<Context> {
        Ok(Context {
            namespace: settings.namespace.clone(),
            metrics: Metrics::default().register(&self.registry)?,
            watch_error_budget: settings.watch_error_budget,
        })
    }

    async fn set_phase(&self, phase: Phase) {
        info!(?phase, "operator phase");
        self.diagnostics.write().await.phase = phase;
    }
}

/// A watcher registered with the orchestrator under its kind
pub type Registered = (String, Arc<dyn ResourceWatcher>);

/// Runs one watcher per resource kind and reconciles them periodically
pub struct PresenceOperator {
    state: State,
    settings: Settings,
}

impl PresenceOperator {
    pub fn new(state: State, settings: Settings) -> Self {
        Self { state, settings }
    }

    /// Load the required objects, build the watchers and supervise them.
    ///
    /// Only returns once `lifetime` ends, with the cause as the error.
    pub async fn run(self, client: Client, lifetime: Lifetime) -> Result<()> {
        let ctx = self.state.to_context(&self.settings)?;
        let namespace = &self.settings.namespace;

        let required = self.load::<ConfigMap>()?;
        info!(count = required.len(), "loaded required ConfigMaps");

        let config_maps = RequiredWatcher::new(
            KubeStore::<ConfigMap>::namespaced(client.clone(), namespace),
            required,
            &ctx,
        );
        let secrets = ObservedWatcher::new(KubeStore::<Secret>::namespaced(client, namespace), &ctx);

        let watchers: Vec<Registered> = vec![
            ("ConfigMap".into(), Arc::new(config_maps)),
            ("Secret".into(), Arc::new(secrets)),
        ];
        self.supervise(lifetime, watchers, ctx.metrics).await
    }

    /// Load the required set of one kind, honoring the configured error policy
    fn load<K>(&self) -> Result<RequiredSet>
    where
        K: kube::Resource,
        K::DynamicType: Default,
    {
        match load_required::<K>(&self.settings.assets_dir, &self.settings.namespace) {
            Ok(required) => Ok(required),
            Err(e) if self.settings.fail_on_load_error => {
                error!("loading required objects: {e}");
                Err(e)
            }
            Err(e) => {
                error!("loading required objects, continuing without: {e}");
                Ok(RequiredSet::new())
            }
        }
    }

    /// Start the watchers, wait for them to settle, then reconcile periodically.
    ///
    /// Any watcher returning ends the lifetime for all of them.
    pub async fn supervise(
        &self,
        lifetime: Lifetime,
        watchers: Vec<Registered>,
        metrics: Metrics,
    ) -> Result<()> {
        self.state.set_phase(Phase::StartingWatchers).await;
        let mut tasks = JoinSet::new();
        for (kind, watcher) in &watchers {
            tasks.spawn(run_watcher(kind.clone(), watcher.clone(), lifetime.clone()));
        }

        let reconciler = Arc::new(Reconciler {
            watchers,
            metrics,
            diagnostics: self.state.diagnostics.clone(),
        });
        let trigger = TryBuffer::new(
            self.settings.trigger_window,
            self.settings.trigger_rearm,
            reconciler.clone().action(),
        );

        // Give the watchers time to complete their initial listing
        self.state.set_phase(Phase::Settling).await;
        let settled = tokio::select! {
            _ = lifetime.cancelled() => false,
            _ = sleep(self.settings.settle_delay) => true,
        };

        if settled {
            self.state.set_phase(Phase::InitialSync).await;
            trigger.try_fire();
            tokio::select! {
                _ = lifetime.cancelled() => {},
                _ = reconciler.every(self.settings.sync_interval) => {},
            }
        }

        self.state.set_phase(Phase::ShuttingDown).await;
        trigger.close();
        tasks.shutdown().await;

        let cause = lifetime.cause().unwrap_or(Cause::Signal);
        let mut diagnostics = self.state.diagnostics.write().await;
        diagnostics.phase = Phase::Stopped;
        diagnostics.cause = Some(cause.to_string());
        info!(%cause, "operator stopped");
        Err(Error::Cancelled(cause))
    }
}

/// Drive one watcher to completion and end the lifetime when it stops
fn run_watcher(
    kind: String,
    watcher: Arc<dyn ResourceWatcher>,
    lifetime: Lifetime,
) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let result = watcher.run(lifetime.clone()).await;
        if let Err(e) = &result {
            error!(kind = %kind, "run {kind} watcher: {e}");
        }
        lifetime.cancel(Cause::WatcherStopped {
            kind,
            error: result.err().map(|e| e.to_string()),
        });
    }
}

/// Performs reconciliation passes over every watcher
struct Reconciler {
    watchers: Vec<Registered>,
    metrics: Metrics,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl Reconciler {
    /// One pass as a deferred action for the startup trigger
    fn action(self: Arc<Self>) -> Action {
        Arc::new(move || {
            let reconciler = self.clone();
            async move { reconciler.sync_all().await }.boxed()
        })
    }

    /// Reconcile on a fixed period, starting one period from now
    async fn every(&self, period: std::time::Duration) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.sync_all().await;
        }
    }

    #[instrument(skip(self), fields(trace_id))]
    async fn sync_all(&self) {
        let trace_id = telemetry::get_trace_id();
        Span::current().record("trace_id", &field::display(&trace_id));
        let _timer = self.metrics.count_and_measure();

        for (kind, watcher) in &self.watchers {
            debug!(kind = %kind, "syncing");
            watcher.sync().await;
        }

        let mut diagnostics = self.diagnostics.write().await;
        diagnostics.last_sync = Some(Utc::now());
        diagnostics.syncs += 1;
        if diagnostics.phase == Phase::InitialSync {
            info!(phase = ?Phase::SteadyState, "operator phase");
            diagnostics.phase = Phase::SteadyState;
        }
    }
}
