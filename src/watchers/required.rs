use std::{fmt::Debug, path::Path};

use async_trait::async_trait;
use kube::Resource;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::{required::RequiredSet, store::ObjectStore, Error, Lifetime, ObjectKey, Result};

use super::{Context, EventHooks, ResourceWatcher, Tracker};

/// A watcher that keeps every object of its required set in existence.
///
/// Missing objects are created from their manifests on every [`sync`], and a
/// required object is recreated as soon as its deletion is observed.
///
/// [`sync`]: ResourceWatcher::sync
pub struct RequiredWatcher<K, S> {
    tracker: Tracker<K, S>,
    required: RequiredSet,
}

impl<K, S> RequiredWatcher<K, S>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
    S: ObjectStore<K>,
{
    pub fn new(store: S, required: RequiredSet, ctx: &Context) -> Self {
        Self {
            tracker: Tracker::new(store, ctx),
            required,
        }
    }

    pub fn tracker(&self) -> &Tracker<K, S> {
        &self.tracker
    }

    pub fn required(&self) -> &RequiredSet {
        &self.required
    }

    /// Attempt to create one required object, logging instead of failing
    async fn create(&self, key: &ObjectKey, source: &Path) {
        let kind = self.tracker.kind();
        info!(kind, %key, "creating");
        self.tracker.metrics().creation(kind);

        // Presence is only learned from the change stream, a delete may race this create
        match self.try_create(source).await {
            Ok(()) => debug!(kind, %key, "created"),
            Err(e @ (Error::ReadDefinition { .. } | Error::ParseDefinition { .. })) => {
                error!(kind, %key, "not able to load definition: {e}");
                self.tracker.metrics().creation_failure(kind, &e);
            }
            Err(e) => {
                warn!(kind, %key, "create failed: {e}");
                self.tracker.metrics().creation_failure(kind, &e);
            }
        }
    }

    async fn try_create(&self, source: &Path) -> Result<()> {
        let contents = tokio::fs::read(source)
            .await
            .map_err(|e| Error::ReadDefinition {
                path: source.to_path_buf(),
                source: e,
            })?;
        let mut obj: K = serde_yaml::from_slice(&contents).map_err(|e| Error::ParseDefinition {
            path: source.to_path_buf(),
            source: e,
        })?;

        // Definitions are always materialized in the watched namespace
        let meta = obj.meta_mut();
        meta.namespace = Some(self.tracker.namespace().to_string());
        meta.resource_version = None;

        self.tracker.store().create(&obj).await?;
        Ok(())
    }
}

#[async_trait]
impl<K, S> EventHooks<K> for RequiredWatcher<K, S>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
    S: ObjectStore<K>,
{
    // Content validation of required objects would hook into on_add / on_update

    async fn on_delete(&self, key: &ObjectKey) {
        if let Some(source) = self.required.get(key) {
            info!(kind = self.tracker.kind(), %key, "required object deleted, recreating");
            self.create(key, source).await;
        }
    }
}

#[async_trait]
impl<K, S> ResourceWatcher for RequiredWatcher<K, S>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
    S: ObjectStore<K>,
{
    async fn run(&self, lifetime: Lifetime) -> Result<()> {
        self.tracker.watch(lifetime, self).await
    }

    async fn sync(&self) {
        for key in self.tracker.missing(&self.required).await {
            info!(kind = self.tracker.kind(), %key, "missing from cluster");
            if let Some(source) = self.required.get(key) {
                self.create(key, source).await;
            }
        }
    }
}
