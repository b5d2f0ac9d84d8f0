//! List/watch capability over a custom resource.
//!
//! The reconciliation loop only sees [`ListerWatcher`]: it can take a snapshot,
//! subscribe to changes after that snapshot, and get an empty instance of the
//! object type. It never names the concrete resource type, so one loop can
//! drive any kind.
//!
//! The adapters here do not retry and do not register anything. Failures are
//! handed back as [`OperatorError::Transport`].

use crate::error::OperatorError;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use kube::api::{ListParams, ObjectList, WatchEvent, WatchParams};
use kube::{Api, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;

/// Stream of change events produced by [`ListerWatcher::watch`].
pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, kube::Error>>;

/// Generic list + watch access to one resource kind.
#[async_trait]
pub trait ListerWatcher: Send + Sync + 'static {
    /// Concrete object type
    type Object: Clone + Send + Sync + 'static;

    /// Returns every object matching `lp`.
    ///
    /// The list's `metadata.resourceVersion` is the point a following
    /// [`watch`](ListerWatcher::watch) should start from.
    async fn list(&self, lp: &ListParams) -> Result<ObjectList<Self::Object>, OperatorError>;

    /// Opens a watch for changes strictly after `resource_version`.
    ///
    /// The stream is unbounded; it ends when the server closes it. The caller
    /// re-opens it.
    async fn watch(
        &self,
        wp: &WatchParams,
        resource_version: &str,
    ) -> Result<WatchStream<Self::Object>, OperatorError>;

    /// Empty instance of the object type.
    fn object_prototype(&self) -> Self::Object;
}

#[async_trait]
impl<L: ListerWatcher> ListerWatcher for Arc<L> {
    type Object = L::Object;

    async fn list(&self, lp: &ListParams) -> Result<ObjectList<Self::Object>, OperatorError> {
        (**self).list(lp).await
    }

    async fn watch(
        &self,
        wp: &WatchParams,
        resource_version: &str,
    ) -> Result<WatchStream<Self::Object>, OperatorError> {
        (**self).watch(wp, resource_version).await
    }

    fn object_prototype(&self) -> Self::Object {
        (**self).object_prototype()
    }
}

/// [`ListerWatcher`] backed by a `kube::Api`.
///
/// The filter is whatever the `Api` was built with; an `Api::all` handle
/// lists and watches across every namespace.
#[derive(Clone, Debug)]
pub struct ApiListWatch<K> {
    api: Api<K>,
}

impl<K> ApiListWatch<K> {
    /// Wraps an API handle.
    #[must_use]
    pub fn new(api: Api<K>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<K> ListerWatcher for ApiListWatch<K>
where
    K: Resource + Clone + Debug + Default + DeserializeOwned + Send + Sync + 'static,
{
    type Object = K;

    async fn list(&self, lp: &ListParams) -> Result<ObjectList<K>, OperatorError> {
        self.api.list(lp).await.map_err(OperatorError::Transport)
    }

    async fn watch(&self, wp: &WatchParams, resource_version: &str) -> Result<WatchStream<K>, OperatorError> {
        self.api
            .watch(wp, resource_version)
            .await
            .map(StreamExt::boxed)
            .map_err(OperatorError::Transport)
    }

    fn object_prototype(&self) -> K {
        K::default()
    }
}

/// `apiVersion/kind` of an object, read from its serialized form.
///
/// Works on prototypes: custom resources serialize their type meta even when
/// everything else is empty.
pub fn describe_kind<K: Serialize>(object: &K) -> String {
    let value = serde_json::to_value(object).unwrap_or_default();
    let field = |name: &str| {
        value
            .get(name)
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    format!("{}/{}", field("apiVersion"), field("kind"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_client, pipeline, respond, status};
    use crds::Pipeline;
    use futures::TryStreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_describe_prototype_kind() {
        let (client, _handle) = mock_client();
        let lw = ApiListWatch::new(Api::<Pipeline>::all(client));
        let prototype = lw.object_prototype();

        assert!(prototype.metadata.name.is_none());
        assert!(prototype.spec.steps.is_empty());
        assert_eq!(describe_kind(&prototype), "pipeline.duke.lol/v1alpha1/Pipeline");
        assert!(format!("{lw:?}").starts_with("ApiListWatch { api: Api {"));
    }

    #[tokio::test]
    async fn test_list_returns_all_namespaces() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::GET);
            // Cluster-wide path, no selectors
            let uri = request.uri().to_string();
            assert!(uri.starts_with("/apis/pipeline.duke.lol/v1alpha1/pipelines"), "{uri}");
            assert!(!uri.contains("labelSelector") && !uri.contains("fieldSelector"), "{uri}");
            respond(
                send,
                200,
                &json!({
                    "apiVersion": "pipeline.duke.lol/v1alpha1",
                    "kind": "PipelineList",
                    "metadata": { "resourceVersion": "42" },
                    "items": [pipeline("ci", "build", "40"), pipeline("prod", "release", "41")]
                }),
            );
        });

        let lw = ApiListWatch::new(Api::<Pipeline>::all(client));
        let list = lw.list(&ListParams::default()).await.unwrap();
        assert_eq!(list.metadata.resource_version.as_deref(), Some("42"));
        let names: Vec<_> = list
            .items
            .iter()
            .map(|p| format!("{}/{}", p.metadata.namespace.as_deref().unwrap(), p.metadata.name.as_deref().unwrap()))
            .collect();
        assert_eq!(names, ["ci/build", "prod/release"]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_watch_starts_at_given_version() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            let uri = request.uri().to_string();
            assert!(uri.contains("watch=true"), "{uri}");
            assert!(uri.contains("resourceVersion=42"), "{uri}");

            let mut lines = Vec::new();
            for event in [
                json!({ "type": "ADDED", "object": pipeline("ci", "lint", "43") }),
                json!({ "type": "DELETED", "object": pipeline("ci", "build", "44") }),
            ] {
                lines.extend(serde_json::to_vec(&event).unwrap());
                lines.push(b'\n');
            }
            send.send_response(http::Response::builder().body(kube::client::Body::from(lines)).unwrap());
        });

        let lw = ApiListWatch::new(Api::<Pipeline>::all(client));
        let events: Vec<_> = lw
            .watch(&WatchParams::default(), "42")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], WatchEvent::Added(p) if p.metadata.name.as_deref() == Some("lint")));
        assert!(matches!(&events[1], WatchEvent::Deleted(p) if p.metadata.name.as_deref() == Some("build")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_list_error_propagates_as_transport() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::GET);
            respond(
                send,
                403,
                &status("Forbidden", "pipelines is forbidden", 403),
            );
        });

        let lw = ApiListWatch::new(Api::<Pipeline>::all(client));
        let err = lw.list(&ListParams::default()).await.err().unwrap();
        assert!(matches!(err, OperatorError::Transport(_)), "got {err:?}");
        assert_eq!(
            match &err {
                OperatorError::Transport(e) => crate::error::api_status_code(e),
                _ => None,
            },
            Some(403)
        );
        server.await.unwrap();
    }
}
