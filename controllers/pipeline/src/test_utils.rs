//! Test utilities
//!
//! A mocked API server built on `tower_test`, object builders, and scripted
//! fakes for the list/watch and registration seams.

use crate::error::OperatorError;
use crate::listwatch::{ListerWatcher, WatchStream};
use crate::registrar::TypeRegistrar;
use async_trait::async_trait;
use crds::{Pipeline, PipelineSpec, PipelineStep, ResourceTypeDescriptor};
use futures::StreamExt;
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use kube::Client;
use kube::api::{ListParams, ObjectList, TypeMeta, WatchEvent, WatchParams};
use kube::client::Body;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Handle answering requests sent through a mocked client.
pub type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

/// Responder for one intercepted request.
pub type SendResponse = tower_test::mock::SendResponse<Response<Body>>;

/// Client whose requests arrive on the returned handle.
pub fn mock_client() -> (Client, ApiServerHandle) {
    let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
    (Client::new(mock_service, "default"), handle)
}

/// Answers a request with a JSON body, as the API server would.
pub fn respond(send: SendResponse, code: u16, body: &Value) {
    let response = Response::builder()
        .status(code)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send.send_response(response);
}

/// `metav1.Status` failure body.
pub fn status(reason: &str, message: &str, code: u16) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    })
}

/// Reads a request body as JSON.
pub async fn body_json(request: Request<Body>) -> Value {
    let bytes = request.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Pipeline with identity metadata filled in.
pub fn pipeline(namespace: &str, name: &str, resource_version: &str) -> Pipeline {
    let mut pipeline = Pipeline::new(
        name,
        PipelineSpec {
            repository: Some(format!("https://git.example.com/{name}.git")),
            steps: vec![PipelineStep {
                name: "build".to_string(),
                image: "rust:1".to_string(),
                commands: vec!["cargo build".to_string()],
            }],
        },
    );
    pipeline.metadata.namespace = Some(namespace.to_string());
    pipeline.metadata.resource_version = Some(resource_version.to_string());
    pipeline.metadata.generation = Some(1);
    pipeline
}

/// Object list at a given resource version.
pub fn object_list(resource_version: &str, items: Vec<Pipeline>) -> ObjectList<Pipeline> {
    ObjectList {
        types: TypeMeta {
            api_version: "pipeline.duke.lol/v1alpha1".to_string(),
            kind: "PipelineList".to_string(),
        },
        metadata: ListMeta {
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        items,
    }
}

/// Transport failure that never reached the API server.
pub fn transport_error(message: &str) -> kube::Error {
    kube::Error::Service(message.into())
}

/// `ERROR` watch event with the given status code, e.g. `410 Gone`.
pub fn error_event(code: u16, reason: &str) -> WatchEvent<Pipeline> {
    serde_json::from_value(json!({ "type": "ERROR", "object": status(reason, reason, code) })).unwrap()
}

/// `BOOKMARK` watch event carrying only a resource version.
pub fn bookmark_event(resource_version: &str) -> WatchEvent<Pipeline> {
    serde_json::from_value(json!({
        "type": "BOOKMARK",
        "object": {
            "apiVersion": "pipeline.duke.lol/v1alpha1",
            "kind": "Pipeline",
            "metadata": { "resourceVersion": resource_version },
        },
    }))
    .unwrap()
}

/// Polls `check` until it holds, failing the test after two seconds.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Scripted watch response.
pub struct ScriptedWatch {
    /// Events delivered in order
    pub events: Vec<Result<WatchEvent<Pipeline>, kube::Error>>,
    /// Keep the stream open after the events instead of ending it
    pub hold_open: bool,
}

/// [`ListerWatcher`] answering from queued scripts.
///
/// Once a queue is drained the call never completes, which parks the loop
/// until it is cancelled.
#[derive(Default)]
pub struct FakeListerWatcher {
    lists: Mutex<VecDeque<Result<ObjectList<Pipeline>, OperatorError>>>,
    watches: Mutex<VecDeque<Result<ScriptedWatch, OperatorError>>>,
    watch_versions: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
}

impl FakeListerWatcher {
    /// Queues a list result.
    pub fn push_list(&self, result: Result<ObjectList<Pipeline>, OperatorError>) {
        self.lists.lock().unwrap().push_back(result);
    }

    /// Queues a watch result.
    pub fn push_watch(&self, result: Result<ScriptedWatch, OperatorError>) {
        self.watches.lock().unwrap().push_back(result);
    }

    /// Resource versions passed to `watch`, in call order.
    pub fn watch_versions(&self) -> Vec<String> {
        self.watch_versions.lock().unwrap().clone()
    }

    /// Number of `list` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListerWatcher for FakeListerWatcher {
    type Object = Pipeline;

    async fn list(&self, _lp: &ListParams) -> Result<ObjectList<Pipeline>, OperatorError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.lists.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => futures::future::pending().await,
        }
    }

    async fn watch(&self, _wp: &WatchParams, resource_version: &str) -> Result<WatchStream<Pipeline>, OperatorError> {
        self.watch_versions.lock().unwrap().push(resource_version.to_string());
        let next = self.watches.lock().unwrap().pop_front();
        let script = match next {
            Some(result) => result?,
            None => return futures::future::pending().await,
        };
        let events = futures::stream::iter(script.events);
        Ok(if script.hold_open {
            events.chain(futures::stream::pending()).boxed()
        } else {
            events.boxed()
        })
    }

    fn object_prototype(&self) -> Pipeline {
        Pipeline::default()
    }
}

/// [`TypeRegistrar`] that records calls and returns a fixed answer.
#[derive(Default)]
pub struct FakeRegistrar {
    /// CRD names registered so far
    pub registered: Arc<Mutex<Vec<String>>>,
    /// Fail every call with this reason
    pub fail_with: Option<String>,
}

#[async_trait]
impl TypeRegistrar for FakeRegistrar {
    async fn ensure_registered(&self, descriptor: &ResourceTypeDescriptor) -> Result<(), OperatorError> {
        if let Some(reason) = &self.fail_with {
            return Err(OperatorError::Registration {
                crd: descriptor.crd_name(),
                reason: reason.clone(),
            });
        }
        self.registered.lock().unwrap().push(descriptor.crd_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_list_reads_like_an_api_response() {
        let list = object_list("42", vec![pipeline("ci", "build", "40")]);
        let value = serde_json::to_value(&list).unwrap();

        assert_eq!(value["kind"], "PipelineList");
        assert_eq!(value["apiVersion"], "pipeline.duke.lol/v1alpha1");
        assert_eq!(value["metadata"]["resourceVersion"], "42");
        assert_eq!(value["items"][0]["metadata"]["name"], "build");
    }
}
