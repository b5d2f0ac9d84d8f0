//! Generic list-then-watch reconciliation loop.
//!
//! The `Controller` drives a [`Handler`] from any [`ListerWatcher`]:
//!
//! 1. list everything and apply each object, deleting cached objects that
//!    vanished since the previous list
//! 2. watch from the list's resource version until the stream breaks
//! 3. re-list on `410 Gone`, on error events and on every resync tick
//!
//! List and watch failures back off (Fibonacci) and become fatal after too
//! many in a row. A successful list alone does not clear the count; only a
//! watch that delivers events or runs until it closes or resyncs does.
//! Cancelling the stop token ends the loop cleanly.

use crate::backoff::FibonacciBackoff;
use crate::error::OperatorError;
use crate::handler::Handler;
use crate::listwatch::{ListerWatcher, describe_kind};
use futures::StreamExt;
use kube::api::{ListParams, ObjectList, WatchEvent, WatchParams};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a watch session ended.
#[derive(Debug, PartialEq, Eq)]
enum WatchExit {
    /// Stop token cancelled
    Stopped,
    /// Resync interval elapsed
    Resync,
    /// Resource version unusable, start over with a list
    Relist,
}

/// Reconciliation loop over one resource kind.
pub struct Controller<L: ListerWatcher, H> {
    lister_watcher: L,
    handler: H,
    resync_interval: Duration,
    max_consecutive_failures: u32,
    backoff: FibonacciBackoff,
    /// Last known objects keyed by `namespace/name`
    store: HashMap<String, L::Object>,
}

impl<L: ListerWatcher, H> fmt::Debug for Controller<L, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("resync_interval", &self.resync_interval)
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .field("backoff", &self.backoff)
            .field("cached", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl<L, H> Controller<L, H>
where
    L: ListerWatcher,
    L::Object: Resource + Serialize,
    H: Handler<L::Object>,
{
    /// Creates a controller with the default backoff.
    #[must_use]
    pub fn new(lister_watcher: L, handler: H, resync_interval: Duration, max_consecutive_failures: u32) -> Self {
        Self {
            lister_watcher,
            handler,
            resync_interval,
            max_consecutive_failures,
            backoff: FibonacciBackoff::default(),
            store: HashMap::new(),
        }
    }

    /// Replaces the retry backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: FibonacciBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs until `stop` is cancelled or failures exceed the limit.
    ///
    /// # Errors
    ///
    /// Returns the last list or watch error once `max_consecutive_failures`
    /// attempts in a row have failed.
    pub async fn run(mut self, stop: CancellationToken) -> Result<(), OperatorError> {
        let kind = describe_kind(&self.lister_watcher.object_prototype());
        info!("Starting controller for {}", kind);
        let list_params = ListParams::default();

        loop {
            let listed = tokio::select! {
                biased;
                () = stop.cancelled() => break,
                listed = self.lister_watcher.list(&list_params) => listed,
            };

            let resource_version = match listed {
                Ok(list) => self.apply_list(list).await,
                Err(e) => {
                    self.on_failure(&kind, e, &stop).await?;
                    continue;
                }
            };

            debug!("Listed {} {} objects at resource version {:?}", self.store.len(), kind, resource_version);
            match self.watch_from(&kind, resource_version, &stop).await? {
                WatchExit::Stopped => break,
                WatchExit::Resync => {
                    self.backoff.reset();
                    debug!("Resyncing {}", kind);
                }
                WatchExit::Relist => {}
            }
        }

        info!("Controller for {} stopped", kind);
        Ok(())
    }

    /// Applies a full listing and returns its resource version.
    async fn apply_list(&mut self, list: ObjectList<L::Object>) -> String {
        let resource_version = list.metadata.resource_version.clone().unwrap_or_default();
        let listed: HashSet<String> = list.items.iter().map(object_key).collect();

        let previous = std::mem::take(&mut self.store);
        for (key, object) in previous {
            if !listed.contains(&key) {
                self.notify_delete(&key, &object).await;
            }
        }

        for object in list.items {
            let key = object_key(&object);
            self.notify_apply(&key, &object).await;
            self.store.insert(key, object);
        }

        resource_version
    }

    /// Follows changes from `resource_version`, re-opening streams that end.
    async fn watch_from(
        &mut self,
        kind: &str,
        mut resource_version: String,
        stop: &CancellationToken,
    ) -> Result<WatchExit, OperatorError> {
        let watch_params = WatchParams::default();
        let resync = tokio::time::sleep(self.resync_interval);
        tokio::pin!(resync);

        loop {
            let opened = tokio::select! {
                biased;
                () = stop.cancelled() => return Ok(WatchExit::Stopped),
                () = &mut resync => return Ok(WatchExit::Resync),
                opened = self.lister_watcher.watch(&watch_params, &resource_version) => opened,
            };

            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    self.on_failure(kind, e, stop).await?;
                    return Ok(WatchExit::Relist);
                }
            };
            debug!("Watching {} from resource version {:?}", kind, resource_version);

            loop {
                let event = tokio::select! {
                    biased;
                    () = stop.cancelled() => return Ok(WatchExit::Stopped),
                    () = &mut resync => return Ok(WatchExit::Resync),
                    event = stream.next() => event,
                };

                match event {
                    None => {
                        self.backoff.reset();
                        debug!("Watch for {} closed, reopening", kind);
                        break;
                    }
                    Some(Ok(WatchEvent::Added(object) | WatchEvent::Modified(object))) => {
                        self.backoff.reset();
                        if let Some(version) = object.resource_version() {
                            resource_version = version;
                        }
                        let key = object_key(&object);
                        self.notify_apply(&key, &object).await;
                        self.store.insert(key, object);
                    }
                    Some(Ok(WatchEvent::Deleted(object))) => {
                        self.backoff.reset();
                        if let Some(version) = object.resource_version() {
                            resource_version = version;
                        }
                        let key = object_key(&object);
                        self.store.remove(&key);
                        self.notify_delete(&key, &object).await;
                    }
                    Some(Ok(WatchEvent::Bookmark(bookmark))) => {
                        self.backoff.reset();
                        resource_version = bookmark.metadata.resource_version;
                    }
                    Some(Ok(WatchEvent::Error(status))) if status.code == 410 => {
                        info!("Resource version {:?} for {} expired, relisting", resource_version, kind);
                        return Ok(WatchExit::Relist);
                    }
                    Some(Ok(WatchEvent::Error(status))) => {
                        let err = OperatorError::Watch(format!("{} {}: {}", status.code, status.reason, status.message));
                        self.on_failure(kind, err, stop).await?;
                        return Ok(WatchExit::Relist);
                    }
                    Some(Err(e)) => {
                        self.on_failure(kind, OperatorError::Transport(e), stop).await?;
                        return Ok(WatchExit::Relist);
                    }
                }
            }
        }
    }

    /// Records a failure and sleeps off the backoff, or gives up.
    async fn on_failure(&mut self, kind: &str, err: OperatorError, stop: &CancellationToken) -> Result<(), OperatorError> {
        let delay = self.backoff.next_backoff();
        let failures = self.backoff.failures();
        if failures >= self.max_consecutive_failures {
            error!("Giving up on {} after {} consecutive failures: {}", kind, failures, err);
            return Err(err);
        }

        warn!(
            "List/watch of {} failed ({}/{}), retrying in {}s: {}",
            kind,
            failures,
            self.max_consecutive_failures,
            delay.as_secs(),
            err
        );
        tokio::select! {
            () = stop.cancelled() => {}
            () = tokio::time::sleep(delay) => {}
        }
        Ok(())
    }

    async fn notify_apply(&self, key: &str, object: &L::Object) {
        if let Err(e) = self.handler.on_apply(object).await {
            error!("Failed to handle apply of {}: {:#}", key, e);
        }
    }

    async fn notify_delete(&self, key: &str, object: &L::Object) {
        if let Err(e) = self.handler.on_delete(object).await {
            error!("Failed to handle delete of {}: {:#}", key, e);
        }
    }
}

/// `namespace/name` key; cluster-scoped objects have an empty namespace.
fn object_key<K: Resource>(object: &K) -> String {
    format!("{}/{}", object.namespace().unwrap_or_default(), object.name_any())
}
