//! Helper methods only available for tests
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{
    core::{ErrorResponse, ObjectMeta},
    runtime::watcher,
    ResourceExt,
};
use tokio::sync::mpsc;

use crate::{
    store::{EventStream, ObjectStore},
    watchers::Context,
    Error, Metrics, ObjectKey, Result,
};

type Item<K> = Result<watcher::Event<K>, watcher::Error>;

/// An in-memory [`ObjectStore`] whose change stream is fed by a [`StoreHandle`]
pub struct FakeStore<K> {
    events: Mutex<Option<mpsc::UnboundedReceiver<Item<K>>>>,
    created: Arc<Mutex<Vec<K>>>,
    reject: Arc<Mutex<bool>>,
}

/// Test side of a [`FakeStore`]
#[derive(Clone)]
pub struct StoreHandle<K> {
    events: mpsc::UnboundedSender<Item<K>>,
    created: Arc<Mutex<Vec<K>>>,
    reject: Arc<Mutex<bool>>,
}

impl<K> FakeStore<K> {
    pub fn new() -> (Self, StoreHandle<K>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let created = Arc::new(Mutex::new(Vec::new()));
        let reject = Arc::new(Mutex::new(false));
        let store = Self {
            events: Mutex::new(Some(rx)),
            created: created.clone(),
            reject: reject.clone(),
        };
        let handle = StoreHandle {
            events: tx,
            created,
            reject,
        };
        (store, handle)
    }
}

impl<K: Clone + ResourceExt> StoreHandle<K> {
    pub fn send(&self, event: watcher::Event<K>) {
        self.events.send(Ok(event)).unwrap();
    }

    pub fn fail(&self, message: &str) {
        self.events
            .send(Err(watcher::Error::WatchError(ErrorResponse {
                status: "Failure".into(),
                message: message.into(),
                reason: "InternalError".into(),
                code: 500,
            })))
            .unwrap();
    }

    /// Names of every object submitted for creation, in order
    pub fn created(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|obj| obj.name_any())
            .collect()
    }

    pub fn created_objects(&self) -> Vec<K> {
        self.created.lock().unwrap().clone()
    }

    /// Make every following create fail with a conflict
    pub fn reject_creates(&self) {
        *self.reject.lock().unwrap() = true;
    }
}

#[async_trait]
impl<K> ObjectStore<K> for FakeStore<K>
where
    K: Clone + Send + Sync + 'static,
{
    fn watch(&self) -> EventStream<K> {
        match self.events.lock().unwrap().take() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    async fn create(&self, obj: &K) -> Result<K> {
        self.created.lock().unwrap().push(obj.clone());
        if *self.reject.lock().unwrap() {
            return Err(Error::KubeError(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message: "already exists".into(),
                reason: "AlreadyExists".into(),
                code: 409,
            })));
        }
        Ok(obj.clone())
    }
}

pub fn context() -> Context {
    Context {
        namespace: "default".into(),
        metrics: Metrics::default(),
        watch_error_budget: 3,
    }
}

pub fn config_map(name: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("default".into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn secret(name: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some("default".into()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Write a ConfigMap manifest for each name into `dir` and map it as required
pub fn required_config_maps(dir: &Path, names: &[&str]) -> BTreeMap<ObjectKey, PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(format!("{name}.yaml"));
            std::fs::write(
                &path,
                format!(
                    "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\ndata:\n  owner: presence-operator\n"
                ),
            )
            .unwrap();
            (ObjectKey::new("default", *name), path)
        })
        .collect()
}
