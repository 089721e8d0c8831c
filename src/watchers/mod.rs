use std::{
    fmt::Debug,
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use futures::StreamExt;
use kube::{runtime::watcher::Event, Resource};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    existing::ExistingSet, required::RequiredSet, store::ObjectStore, Error, Lifetime, Metrics,
    ObjectKey, Result,
};

mod observed;
mod required;

pub use observed::ObservedWatcher;
pub use required::RequiredWatcher;

/// The context shared by all watchers
pub struct Context {
    /// Namespace the watchers are scoped to
    pub namespace: String,

    /// Prometheus metrics
    pub metrics: Metrics,

    /// Consecutive stream errors tolerated before a watch is abandoned
    pub watch_error_budget: usize,
}

/// A watcher for one resource kind that can be driven by the orchestrator
#[async_trait]
pub trait ResourceWatcher: Send + Sync {
    /// Consume the change stream until it ends or the lifetime is cancelled
    async fn run(&self, lifetime: Lifetime) -> Result<()>;

    /// Create whatever is required but not observed
    async fn sync(&self);
}

/// Per-event extension points of a watcher
///
/// Called after the existing set has been updated, in arrival order.
#[async_trait]
pub(crate) trait EventHooks<K: Send + Sync + 'static>: Send + Sync {
    /// An object was seen for the first time
    async fn on_add(&self, _obj: &K, _key: &ObjectKey) {}

    /// A known object changed
    async fn on_update(&self, _obj: &K, _key: &ObjectKey) {}

    /// A known object is gone
    async fn on_delete(&self, _key: &ObjectKey) {}
}

/// Tracks which objects of one kind exist, driven by its change stream
pub struct Tracker<K, S> {
    kind: String,
    namespace: String,
    store: S,
    existing: RwLock<ExistingSet>,
    listed: AtomicBool,
    metrics: Metrics,
    error_budget: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K, S> Tracker<K, S>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
    S: ObjectStore<K>,
{
    pub fn new(store: S, ctx: &Context) -> Self {
        Self {
            kind: K::kind(&K::DynamicType::default()).to_string(),
            namespace: ctx.namespace.clone(),
            store,
            existing: RwLock::new(ExistingSet::default()),
            listed: AtomicBool::new(false),
            metrics: ctx.metrics.clone(),
            error_budget: ctx.watch_error_budget.max(1),
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Whether the initial listing has been received
    pub fn is_listed(&self) -> bool {
        self.listed.load(Ordering::SeqCst)
    }

    /// The keys currently believed to exist
    pub async fn snapshot(&self) -> Vec<ObjectKey> {
        self.existing.read().await.keys().to_vec()
    }

    /// Required keys that have not been observed
    pub async fn missing<'a>(&self, required: &'a RequiredSet) -> Vec<&'a ObjectKey> {
        let existing = self.existing.read().await;
        required.keys().filter(|k| !existing.contains(k)).collect()
    }

    /// Consume the change stream, dispatching every event to `hooks`
    pub(crate) async fn watch(&self, lifetime: Lifetime, hooks: &dyn EventHooks<K>) -> Result<()> {
        info!(kind = %self.kind, namespace = %self.namespace, "{} watcher started", self.kind);
        let mut stream = self.store.watch();
        let mut errors = 0;

        let result = loop {
            let next = tokio::select! {
                _ = lifetime.cancelled() => break Ok(()),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    errors = 0;
                    self.apply(event, hooks).await;
                }
                Some(Err(source)) => {
                    errors += 1;
                    warn!(kind = %self.kind, errors, "watch error: {source}");
                    if errors >= self.error_budget {
                        break Err(Error::WatchFailed {
                            kind: self.kind.clone(),
                            errors,
                            source,
                        });
                    }
                }
                None => {
                    debug!(kind = %self.kind, "change stream ended");
                    break Ok(());
                }
            }
        };

        info!(kind = %self.kind, "{} watcher stopped", self.kind);
        result
    }

    /// Apply one change event to the existing set
    pub(crate) async fn apply(&self, event: Event<K>, hooks: &dyn EventHooks<K>) {
        match event {
            Event::Applied(obj) => {
                let key = ObjectKey::from_object(&obj, &self.namespace);
                let added = self.existing.write().await.insert(key.clone());
                if added {
                    self.added(&obj, &key, hooks).await;
                } else {
                    self.updated(&obj, &key, hooks).await;
                }
            }
            Event::Deleted(obj) => {
                let key = ObjectKey::from_object(&obj, &self.namespace);
                self.existing.write().await.remove(&key);
                self.deleted(&key, hooks).await;
            }
            Event::Restarted(objs) => {
                let listed: Vec<(ObjectKey, K)> = objs
                    .into_iter()
                    .map(|obj| (ObjectKey::from_object(&obj, &self.namespace), obj))
                    .collect();

                // Swap in the listing, then replay the difference through the hooks
                let previous = {
                    let mut existing = self.existing.write().await;
                    let previous = existing.clone();
                    existing.replace(listed.iter().map(|(key, _)| key.clone()));
                    previous
                };

                for key in previous.keys() {
                    if !listed.iter().any(|(k, _)| k == key) {
                        self.deleted(key, hooks).await;
                    }
                }
                for (key, obj) in &listed {
                    if previous.contains(key) {
                        self.updated(obj, key, hooks).await;
                    } else {
                        self.added(obj, key, hooks).await;
                    }
                }

                if !self.listed.swap(true, Ordering::SeqCst) {
                    info!(kind = %self.kind, objects = listed.len(), "initial listing complete");
                } else {
                    debug!(kind = %self.kind, objects = listed.len(), "relisted");
                }
            }
        }
    }

    async fn added(&self, obj: &K, key: &ObjectKey, hooks: &dyn EventHooks<K>) {
        info!(kind = %self.kind, %key, "on add");
        self.metrics.watch_event(&self.kind, "added");
        hooks.on_add(obj, key).await;
    }

    async fn updated(&self, obj: &K, key: &ObjectKey, hooks: &dyn EventHooks<K>) {
        debug!(kind = %self.kind, %key, "on update");
        self.metrics.watch_event(&self.kind, "updated");
        hooks.on_update(obj, key).await;
    }

    async fn deleted(&self, key: &ObjectKey, hooks: &dyn EventHooks<K>) {
        info!(kind = %self.kind, %key, "on delete");
        self.metrics.watch_event(&self.kind, "deleted");
        hooks.on_delete(key).await;
    }
}
