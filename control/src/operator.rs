//! Operator runtime
//!
//! Watches every kind the render pipeline reads into the shared [`Stores`],
//! renders after each burst of changes, and writes the staged
//! [`UpdateQueue`] back to the API server.
//!
//! ## Flow
//! 1. One watcher task per kind mirrors the cluster into its [`Store`]
//! 2. Every store change wakes the render loop through a [`Notify`]
//! 3. The loop waits out the debounce window, runs [`Renderer::render_all`]
//!    and applies the result
//!
//! Rendered objects go out as server-side apply patches owned by
//! [`FIELD_MANAGER`]; statuses as merge patches on the status subresource.

use crate::apis::metrics::record_apply;
use crate::apis::status::{now_rfc3339, stamp_conditions};
use crate::apis::{Dataplane, Gateway, GatewayClass, GatewayConfig, UDPRoute};
use crate::config::ControllerConfig;
use crate::renderer::Renderer;
use crate::store::{ObjectKey, Store, Stores};
use crate::update::{Keyed, UpdateQueue};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::watcher;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Field manager for server-side apply and status patches
pub const FIELD_MANAGER: &str = "turngate-operator";

pub struct Operator {
    client: Client,
    stores: Arc<Stores>,
    renderer: Renderer,
    changed: Arc<Notify>,
}

impl Operator {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let stores = Arc::new(Stores::new());
        let renderer = Renderer::new(Arc::clone(&stores), config);
        Self {
            client,
            stores,
            renderer,
            changed: Arc::new(Notify::new()),
        }
    }

    /// Start the watchers and run the render loop until the task is dropped
    pub async fn run(self) -> Result<(), kube::Error> {
        info!(
            "Starting operator {} (dataplane mode: {})",
            self.renderer.config().controller_name,
            self.renderer.config().dataplane_mode
        );

        let watchers = self.spawn_watchers();
        self.render_loop().await;

        for handle in watchers {
            handle.abort();
        }
        Ok(())
    }

    fn spawn_watchers(&self) -> Vec<JoinHandle<()>> {
        let c = &self.client;
        vec![
            self.spawn_watcher(Api::<GatewayClass>::all(c.clone()), |s| &s.gateway_classes),
            self.spawn_watcher(Api::<GatewayConfig>::all(c.clone()), |s| &s.gateway_configs),
            self.spawn_watcher(Api::<Gateway>::all(c.clone()), |s| &s.gateways),
            self.spawn_watcher(Api::<UDPRoute>::all(c.clone()), |s| &s.udp_routes),
            self.spawn_watcher(Api::<Service>::all(c.clone()), |s| &s.services),
            self.spawn_watcher(Api::<EndpointSlice>::all(c.clone()), |s| &s.endpoint_slices),
            self.spawn_watcher(Api::<Node>::all(c.clone()), |s| &s.nodes),
            self.spawn_watcher(Api::<Secret>::all(c.clone()), |s| &s.secrets),
            self.spawn_watcher(Api::<Dataplane>::all(c.clone()), |s| &s.dataplanes),
        ]
    }

    fn spawn_watcher<K>(&self, api: Api<K>, table: fn(&Stores) -> &Store<K>) -> JoinHandle<()>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        let stores = Arc::clone(&self.stores);
        let changed = Arc::clone(&self.changed);
        tokio::spawn(async move { watch_into(api, table(&stores), &changed).await })
    }

    async fn render_loop(&self) {
        let debounce = Duration::from_millis(self.renderer.config().render_debounce_ms);
        loop {
            self.changed.notified().await;
            // Coalesce the rest of the burst into this pass
            tokio::time::sleep(debounce).await;

            let queue = self.renderer.render_all();
            debug!("Render pass staged {} write(s)", queue.len());
            self.apply(queue).await;
        }
    }

    /// Write every staged object and status, logging failures per object
    pub async fn apply(&self, queue: UpdateQueue) {
        for cm in queue.config_maps.into_objects() {
            self.apply_object(cm).await;
        }
        for deploy in queue.deployments.into_objects() {
            self.apply_object(deploy).await;
        }
        for svc in queue.services.into_objects() {
            self.apply_object(svc).await;
        }

        for mut update in queue.gateway_class_statuses.into_objects() {
            stamp_conditions(&mut update.status.conditions, &now_rfc3339());
            let api: Api<GatewayClass> = Api::all(self.client.clone());
            self.patch_status(api, &update.key, "GatewayClass", &update.status).await;
        }
        for mut update in queue.gateway_statuses.into_objects() {
            let now = now_rfc3339();
            stamp_conditions(&mut update.status.conditions, &now);
            for listener in update.status.listeners.iter_mut() {
                stamp_conditions(&mut listener.conditions, &now);
            }
            let api: Api<Gateway> = namespaced_api(&self.client, &update.key);
            self.patch_status(api, &update.key, "Gateway", &update.status).await;
        }
        for mut update in queue.route_statuses.into_objects() {
            let now = now_rfc3339();
            for parent in update.status.parents.iter_mut() {
                stamp_conditions(&mut parent.conditions, &now);
            }
            let api: Api<UDPRoute> = namespaced_api(&self.client, &update.key);
            self.patch_status(api, &update.key, "UDPRoute", &update.status).await;
        }
    }

    async fn apply_object<K>(&self, obj: K)
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Keyed
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
        K::DynamicType: Default,
    {
        let key = obj.key();
        let kind = K::kind(&K::DynamicType::default()).to_string();
        let api: Api<K> = namespaced_api(&self.client, &key);

        let params = PatchParams::apply(FIELD_MANAGER).force();
        match api.patch(&key.name, &params, &Patch::Apply(&obj)).await {
            Ok(_) => {
                debug!("Applied {} {}", kind, key);
                record_apply(&kind, "ok");
            }
            Err(e) => {
                error!("Failed to apply {} {}: {}", kind, key, e);
                record_apply(&kind, "error");
            }
        }
    }

    async fn patch_status<K, S>(&self, api: Api<K>, key: &ObjectKey, kind: &str, status: &S)
    where
        K: Resource + Clone + DeserializeOwned + Debug,
        S: Serialize,
    {
        let patch = json!({ "status": status });
        match api
            .patch_status(&key.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                debug!("Updated {} {} status", kind, key);
                record_apply(&format!("{}Status", kind), "ok");
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                // Deleted since the pass started
                debug!("{} {} is gone, dropping status", kind, key);
            }
            Err(e) => {
                warn!("Failed to update {} {} status: {}", kind, key, e);
                record_apply(&format!("{}Status", kind), "error");
            }
        }
    }
}

fn namespaced_api<K>(client: &Client, key: &ObjectKey) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match &key.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::default_namespaced(client.clone()),
    }
}

/// Mirror one kind into `store`, waking `changed` after every change
///
/// A relist replaces the whole table once the initial listing completes, so
/// objects deleted while the watch was down disappear too.
async fn watch_into<K>(api: Api<K>, store: &Store<K>, changed: &Notify)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let kind = store.kind();
    let stream = watcher(api, WatcherConfig::default());
    futures::pin_mut!(stream);

    info!("Starting {} watcher", kind);
    let mut relist: Vec<K> = Vec::new();

    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Init) => {
                debug!("{} watcher initialized", kind);
                relist.clear();
            }
            Ok(watcher::Event::InitApply(obj)) => relist.push(obj),
            Ok(watcher::Event::InitDone) => {
                store.replace(std::mem::take(&mut relist));
                info!("{} watcher initial sync complete: {} object(s)", kind, store.len());
                changed.notify_one();
            }
            Ok(watcher::Event::Apply(obj)) => {
                if store.upsert(obj) {
                    changed.notify_one();
                }
            }
            Ok(watcher::Event::Delete(obj)) => {
                if let Some(key) = ObjectKey::from_object(&obj) {
                    store.delete(&key);
                    changed.notify_one();
                }
            }
            Err(e) => {
                warn!("{} watcher error: {}", kind, e);
            }
        }
    }
}
