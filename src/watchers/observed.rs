use std::fmt::Debug;

use async_trait::async_trait;
use kube::Resource;
use tracing::debug;

use crate::{required::RequiredSet, store::ObjectStore, Lifetime, Result};

use super::{Context, EventHooks, ResourceWatcher, Tracker};

/// A watch-only watcher: it tracks what exists but never creates anything.
pub struct ObservedWatcher<K, S> {
    tracker: Tracker<K, S>,
    required: RequiredSet,
}

impl<K, S> ObservedWatcher<K, S>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
    S: ObjectStore<K>,
{
    pub fn new(store: S, ctx: &Context) -> Self {
        Self {
            tracker: Tracker::new(store, ctx),
            required: RequiredSet::new(),
        }
    }

    /// Attach definitions for reporting; they are never acted upon
    pub fn with_required(mut self, required: RequiredSet) -> Self {
        self.required = required;
        self
    }

    pub fn tracker(&self) -> &Tracker<K, S> {
        &self.tracker
    }
}

#[async_trait]
impl<K, S> EventHooks<K> for ObservedWatcher<K, S>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
    S: ObjectStore<K>,
{
}

#[async_trait]
impl<K, S> ResourceWatcher for ObservedWatcher<K, S>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Default,
    S: ObjectStore<K>,
{
    async fn run(&self, lifetime: Lifetime) -> Result<()> {
        self.tracker.watch(lifetime, self).await
    }

    /// Placeholder: reconciliation of this kind is not implemented, so
    /// missing objects are only reported.
    async fn sync(&self) {
        let missing = self.tracker.missing(&self.required).await;
        debug!(
            kind = self.tracker.kind(),
            missing = missing.len(),
            "watch-only kind, nothing to create"
        );
    }
}
