use std::fmt::Debug;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use kube::{
    api::PostParams,
    runtime::{watcher, WatchStreamExt},
    Api, Client, Resource,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::Result;

/// The change stream of one resource kind
pub type EventStream<K> = BoxStream<'static, Result<watcher::Event<K>, watcher::Error>>;

/// Access to the objects of one resource kind within one namespace
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Subscribe to changes, starting with a full listing
    fn watch(&self) -> EventStream<K>;

    /// Create a fully formed object
    async fn create(&self, obj: &K) -> Result<K>;
}

/// [`ObjectStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore<K> {
    api: Api<K>,
    config: watcher::Config,
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            config: watcher::Config::default().page_size(50).any_semantic(),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static,
    <K as Resource>::DynamicType: Default,
{
    fn watch(&self) -> EventStream<K> {
        watcher(self.api.clone(), self.config.clone())
            .default_backoff()
            .boxed()
    }

    async fn create(&self, obj: &K) -> Result<K> {
        Ok(self.api.create(&PostParams::default(), obj).await?)
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use assert_json_diff::assert_json_include;
    use http::{Method, Request, Response};
    use hyper::Body;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::core::ObjectMeta;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn create_posts_to_the_namespaced_collection() {
        let (mock_service, mut handle) =
            tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let store = KubeStore::<ConfigMap>::namespaced(client, "team-a");

        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("app-config".into()),
                namespace: Some("team-a".into()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("mode".into(), "fast".into())])),
            ..Default::default()
        };

        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::POST);
            assert_eq!(request.uri().path(), "/api/v1/namespaces/team-a/configmaps");

            let body = hyper::body::to_bytes(request.into_body()).await.unwrap();
            let posted: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_json_include!(
                actual: posted.clone(),
                expected: json!({
                    "metadata": { "name": "app-config" },
                    "data": { "mode": "fast" },
                })
            );

            send.send_response(
                Response::builder()
                    .status(201)
                    .body(Body::from(serde_json::to_vec(&posted).unwrap()))
                    .unwrap(),
            );
        });

        let created = store.create(&cm).await.unwrap();
        assert_eq!(created.metadata.name.as_deref(), Some("app-config"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn create_surfaces_conflicts() {
        let (mock_service, mut handle) =
            tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(mock_service, "default");
        let store = KubeStore::<ConfigMap>::namespaced(client, "default");

        let server = tokio::spawn(async move {
            let (_request, send) = handle.next_request().await.expect("service not called");
            let status = json!({
                "kind": "Status",
                "apiVersion": "v1",
                "status": "Failure",
                "message": "configmaps \"app-config\" already exists",
                "reason": "AlreadyExists",
                "code": 409
            });
            send.send_response(
                Response::builder()
                    .status(409)
                    .body(Body::from(serde_json::to_vec(&status).unwrap()))
                    .unwrap(),
            );
        });

        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("app-config".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = store.create(&cm).await.unwrap_err();
        assert_eq!(err.metric_label(), "alreadyexists");
        server.await.unwrap();
    }
}
