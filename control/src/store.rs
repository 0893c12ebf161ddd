//! Object store
//!
//! Process-wide cache of cluster objects, one table per kind, keyed by
//! namespace+name. Watchers write into [`Stores`]; render passes read an
//! immutable [`StoreSnapshot`].
//!
//! ## Features
//! - Copy-on-write tables: taking a snapshot is O(1) per kind and never
//!   blocks writers for longer than an `Arc` clone
//! - Deterministic iteration order (`BTreeMap`), so identical snapshots
//!   render identical output
//! - Lock poisoning is recovered rather than propagated
//!
//! A cached object whose metadata disagrees with the key it is stored under
//! means the cache was populated incorrectly. Reading it panics: rendering
//! from a corrupt cache would publish wrong configuration.

use crate::apis::{Dataplane, Gateway, GatewayClass, GatewayConfig, UDPRoute};
use k8s_openapi::api::core::v1::{Node, Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

// ============================================================================
// Keys
// ============================================================================

/// Namespace+name identity of a cached object
///
/// Cluster-scoped objects have no namespace. Displays as `namespace/name`,
/// or `name` for cluster-scoped objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of `obj`, `None` if it has no name
    pub fn from_object<K: Resource>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        let name = meta.name.clone()?;
        Some(Self {
            namespace: meta.namespace.clone(),
            name,
        })
    }

    fn matches<K: Resource>(&self, obj: &K) -> bool {
        let meta = obj.meta();
        meta.name.as_deref() == Some(self.name.as_str()) && meta.namespace == self.namespace
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

// ============================================================================
// Lock helpers
// ============================================================================

/// Acquire read lock, recovering from poisoning
fn safe_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during read, recovering");
        poisoned.into_inner()
    })
}

/// Acquire write lock, recovering from poisoning
fn safe_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during write, recovering");
        poisoned.into_inner()
    })
}

/// Fatal: the cache handed out an object under the wrong identity
fn corrupted(kind: &str, key: &ObjectKey) -> ! {
    panic!(
        "object store corrupted: {} cached under {} does not match its metadata",
        kind, key
    )
}

// ============================================================================
// Tables
// ============================================================================

type Objects<K> = Arc<BTreeMap<ObjectKey, Arc<K>>>;

/// Immutable view of one kind
#[derive(Debug)]
pub struct Table<K> {
    kind: &'static str,
    objects: Objects<K>,
}

impl<K> Clone for Table<K> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            objects: Arc::clone(&self.objects),
        }
    }
}

impl<K: Resource> Table<K> {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        let obj = self.objects.get(key)?;
        if !key.matches(obj.as_ref()) {
            corrupted(self.kind, key);
        }
        Some(Arc::clone(obj))
    }

    /// All objects in key order
    pub fn list(&self) -> Vec<Arc<K>> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<K>> + '_ {
        self.objects.iter().map(|(key, obj)| {
            if !key.matches(obj.as_ref()) {
                corrupted(self.kind, key);
            }
            Arc::clone(obj)
        })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Concurrency-safe table for one kind
#[derive(Debug)]
pub struct Store<K> {
    kind: &'static str,
    objects: RwLock<Objects<K>>,
}

impl<K: Resource + Clone> Store<K> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            objects: RwLock::new(Arc::new(BTreeMap::new())),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Insert or replace an object, returns false if it has no name
    pub fn upsert(&self, obj: K) -> bool {
        let Some(key) = ObjectKey::from_object(&obj) else {
            warn!("Ignoring nameless {} object", self.kind);
            return false;
        };

        debug!("Store upsert {} {}", self.kind, key);
        let mut guard = safe_write(&self.objects);
        Arc::make_mut(&mut guard).insert(key, Arc::new(obj));
        true
    }

    pub fn delete(&self, key: &ObjectKey) -> Option<Arc<K>> {
        debug!("Store delete {} {}", self.kind, key);
        let mut guard = safe_write(&self.objects);
        if !guard.contains_key(key) {
            return None;
        }
        Arc::make_mut(&mut guard).remove(key)
    }

    pub fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.snapshot().get(key)
    }

    pub fn list(&self) -> Vec<Arc<K>> {
        self.snapshot().list()
    }

    /// Replace the whole table, used after a watcher relist
    pub fn replace(&self, objects: impl IntoIterator<Item = K>) {
        let mut table = BTreeMap::new();
        for obj in objects {
            match ObjectKey::from_object(&obj) {
                Some(key) => {
                    table.insert(key, Arc::new(obj));
                }
                None => warn!("Ignoring nameless {} object", self.kind),
            }
        }
        debug!("Store replace {}: {} objects", self.kind, table.len());
        *safe_write(&self.objects) = Arc::new(table);
    }

    pub fn len(&self) -> usize {
        safe_read(&self.objects).len()
    }

    pub fn is_empty(&self) -> bool {
        safe_read(&self.objects).is_empty()
    }

    pub fn snapshot(&self) -> Table<K> {
        Table {
            kind: self.kind,
            objects: Arc::clone(&safe_read(&self.objects)),
        }
    }
}

// ============================================================================
// Stores
// ============================================================================

/// One table per kind consumed by the render pipeline
#[derive(Debug)]
pub struct Stores {
    pub gateway_classes: Store<GatewayClass>,
    pub gateway_configs: Store<GatewayConfig>,
    pub gateways: Store<Gateway>,
    pub udp_routes: Store<UDPRoute>,
    pub services: Store<Service>,
    pub endpoint_slices: Store<EndpointSlice>,
    pub nodes: Store<Node>,
    pub secrets: Store<Secret>,
    pub dataplanes: Store<Dataplane>,
}

impl Default for Stores {
    fn default() -> Self {
        Self::new()
    }
}

impl Stores {
    pub fn new() -> Self {
        Self {
            gateway_classes: Store::new("GatewayClass"),
            gateway_configs: Store::new("GatewayConfig"),
            gateways: Store::new("Gateway"),
            udp_routes: Store::new("UDPRoute"),
            services: Store::new("Service"),
            endpoint_slices: Store::new("EndpointSlice"),
            nodes: Store::new("Node"),
            secrets: Store::new("Secret"),
            dataplanes: Store::new("Dataplane"),
        }
    }

    /// Consistent read view of every kind
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            gateway_classes: self.gateway_classes.snapshot(),
            gateway_configs: self.gateway_configs.snapshot(),
            gateways: self.gateways.snapshot(),
            udp_routes: self.udp_routes.snapshot(),
            services: self.services.snapshot(),
            endpoint_slices: self.endpoint_slices.snapshot(),
            nodes: self.nodes.snapshot(),
            secrets: self.secrets.snapshot(),
            dataplanes: self.dataplanes.snapshot(),
        }
    }
}

/// Point-in-time view read by a render pass
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub gateway_classes: Table<GatewayClass>,
    pub gateway_configs: Table<GatewayConfig>,
    pub gateways: Table<Gateway>,
    pub udp_routes: Table<UDPRoute>,
    pub services: Table<Service>,
    pub endpoint_slices: Table<EndpointSlice>,
    pub nodes: Table<Node>,
    pub secrets: Table<Secret>,
    pub dataplanes: Table<Dataplane>,
}

/// Label linking an EndpointSlice to its Service
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

impl StoreSnapshot {
    /// EndpointSlices of a Service, in key order
    pub fn endpoint_slices_for(&self, namespace: &str, service: &str) -> Vec<Arc<EndpointSlice>> {
        self.endpoint_slices
            .iter()
            .filter(|slice| {
                slice.metadata.namespace.as_deref() == Some(namespace)
                    && slice
                        .metadata
                        .labels
                        .as_ref()
                        .and_then(|labels| labels.get(SERVICE_NAME_LABEL))
                        .map(String::as_str)
                        == Some(service)
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn service(namespace: &str, name: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn slice(namespace: &str, name: &str, svc: &str) -> EndpointSlice {
        EndpointSlice {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    SERVICE_NAME_LABEL.to_string(),
                    svc.to_string(),
                )])),
                ..Default::default()
            },
            address_type: "IPv4".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("ns", "gw").to_string(), "ns/gw");
        assert_eq!(ObjectKey::cluster("default").to_string(), "default");
    }

    #[test]
    fn test_upsert_get_delete() {
        let store: Store<Service> = Store::new("Service");
        assert!(store.upsert(service("ns", "svc-1")));
        assert_eq!(store.len(), 1);

        let key = ObjectKey::new("ns", "svc-1");
        assert!(store.get(&key).is_some(), "upserted object should be found");

        assert!(store.delete(&key).is_some());
        assert!(store.get(&key).is_none(), "deleted object should be gone");
        assert!(store.delete(&key).is_none(), "double delete is a no-op");
    }

    #[test]
    fn test_upsert_rejects_nameless_object() {
        let store: Store<Service> = Store::new("Service");
        assert!(!store.upsert(Service::default()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_is_key_ordered() {
        let store: Store<Service> = Store::new("Service");
        store.upsert(service("ns-b", "a"));
        store.upsert(service("ns-a", "z"));
        store.upsert(service("ns-a", "b"));

        let names: Vec<String> = store
            .list()
            .iter()
            .map(|s| ObjectKey::from_object(s.as_ref()).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["ns-a/b", "ns-a/z", "ns-b/a"]);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store: Store<Service> = Store::new("Service");
        store.upsert(service("ns", "svc-1"));

        let snapshot = store.snapshot();
        store.upsert(service("ns", "svc-2"));
        store.delete(&ObjectKey::new("ns", "svc-1"));

        assert_eq!(snapshot.len(), 1, "snapshot must not observe later writes");
        assert!(snapshot.get(&ObjectKey::new("ns", "svc-1")).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_swaps_contents() {
        let store: Store<Service> = Store::new("Service");
        store.upsert(service("ns", "old"));
        store.replace(vec![service("ns", "new-1"), service("ns", "new-2")]);

        assert_eq!(store.len(), 2);
        assert!(store.get(&ObjectKey::new("ns", "old")).is_none());
    }

    #[test]
    #[should_panic(expected = "object store corrupted")]
    fn test_corrupted_entry_panics() {
        let mut table = BTreeMap::new();
        table.insert(
            ObjectKey::new("ns", "svc-1"),
            Arc::new(service("ns", "svc-2")),
        );
        let table = Table {
            kind: "Service",
            objects: Arc::new(table),
        };
        let _ = table.get(&ObjectKey::new("ns", "svc-1"));
    }

    #[test]
    fn test_endpoint_slices_for_service() {
        let stores = Stores::new();
        stores.endpoint_slices.upsert(slice("ns", "svc-abc", "svc"));
        stores.endpoint_slices.upsert(slice("ns", "svc-def", "svc"));
        stores.endpoint_slices.upsert(slice("ns", "other-xyz", "other"));
        stores.endpoint_slices.upsert(slice("ns-2", "svc-ghi", "svc"));

        let snapshot = stores.snapshot();
        assert_eq!(snapshot.endpoint_slices_for("ns", "svc").len(), 2);
        assert!(snapshot.endpoint_slices_for("ns", "missing").is_empty());
    }

    #[test]
    fn test_concurrent_writers_and_snapshots() {
        let stores = Arc::new(Stores::new());
        let mut handles = vec![];
        for i in 0..4 {
            let stores = Arc::clone(&stores);
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    stores.services.upsert(service("ns", &format!("svc-{}-{}", i, j)));
                    let snapshot = stores.snapshot();
                    assert!(snapshot.services.len() >= j + 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stores.services.len(), 200);
    }
}
