//! Update queue
//!
//! A render pass never talks to the API server. It stages every object and
//! status it wants written in an [`UpdateQueue`], and the caller flushes the
//! queue afterwards. Staging the same key twice keeps the later value.

use crate::apis::status::{GatewayClassStatus, GatewayStatus};
use crate::apis::udp_route::UDPRouteStatus;
use crate::store::ObjectKey;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::Resource;
use std::collections::BTreeMap;

/// Something staged under a namespace+name key
pub trait Keyed {
    fn key(&self) -> ObjectKey;
}

fn meta_key<K: Resource>(obj: &K) -> ObjectKey {
    let meta = obj.meta();
    ObjectKey {
        namespace: meta.namespace.clone(),
        name: meta.name.clone().unwrap_or_default(),
    }
}

impl Keyed for ConfigMap {
    fn key(&self) -> ObjectKey {
        meta_key(self)
    }
}

impl Keyed for Deployment {
    fn key(&self) -> ObjectKey {
        meta_key(self)
    }
}

impl Keyed for Service {
    fn key(&self) -> ObjectKey {
        meta_key(self)
    }
}

/// Status subresource to be written onto the object at `key`
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate<S> {
    pub key: ObjectKey,
    pub status: S,
}

impl<S> StatusUpdate<S> {
    pub fn new(key: ObjectKey, status: S) -> Self {
        Self { key, status }
    }
}

impl<S> Keyed for StatusUpdate<S> {
    fn key(&self) -> ObjectKey {
        self.key.clone()
    }
}

pub type GatewayStatusUpdate = StatusUpdate<GatewayStatus>;
pub type RouteStatusUpdate = StatusUpdate<UDPRouteStatus>;
pub type GatewayClassStatusUpdate = StatusUpdate<GatewayClassStatus>;

/// Staged values of one kind, keyed and ordered by [`ObjectKey`]
#[derive(Debug, Clone, PartialEq)]
pub struct StagedQueue<T> {
    items: BTreeMap<ObjectKey, T>,
}

impl<T> Default for StagedQueue<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T: Keyed> StagedQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `item`, returning the value it replaced
    pub fn upsert(&mut self, item: T) -> Option<T> {
        self.items.insert(item.key(), item)
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&T> {
        self.items.get(key)
    }

    /// Staged values in key order
    pub fn objects(&self) -> Vec<&T> {
        self.items.values().collect()
    }

    pub fn into_objects(self) -> Vec<T> {
        self.items.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fold in a later queue, its values win
    pub fn merge(&mut self, later: StagedQueue<T>) {
        self.items.extend(later.items);
    }
}

/// Everything one render pass wants written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateQueue {
    pub config_maps: StagedQueue<ConfigMap>,
    pub deployments: StagedQueue<Deployment>,
    pub services: StagedQueue<Service>,
    pub gateway_statuses: StagedQueue<GatewayStatusUpdate>,
    pub route_statuses: StagedQueue<RouteStatusUpdate>,
    pub gateway_class_statuses: StagedQueue<GatewayClassStatusUpdate>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, later: UpdateQueue) {
        self.config_maps.merge(later.config_maps);
        self.deployments.merge(later.deployments);
        self.services.merge(later.services);
        self.gateway_statuses.merge(later.gateway_statuses);
        self.route_statuses.merge(later.route_statuses);
        self.gateway_class_statuses.merge(later.gateway_class_statuses);
    }

    /// Total number of staged writes
    pub fn len(&self) -> usize {
        self.config_maps.len()
            + self.deployments.len()
            + self.services.len()
            + self.gateway_statuses.len()
            + self.route_statuses.len()
            + self.gateway_class_statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use pretty_assertions::assert_eq;

    fn config_map(ns: &str, name: &str, value: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("k".to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_replaces_by_key() {
        let mut queue = StagedQueue::new();
        assert!(queue.upsert(config_map("ns", "gw", "1")).is_none());
        let replaced = queue.upsert(config_map("ns", "gw", "2"));

        assert!(replaced.is_some(), "second upsert replaces the first");
        assert_eq!(queue.len(), 1);
        let staged = queue.get(&ObjectKey::new("ns", "gw")).unwrap();
        assert_eq!(staged.data.as_ref().unwrap().get("k").unwrap(), "2");
    }

    #[test]
    fn test_objects_in_key_order() {
        let mut queue = StagedQueue::new();
        queue.upsert(config_map("ns-b", "a", ""));
        queue.upsert(config_map("ns-a", "z", ""));
        queue.upsert(config_map("ns-a", "b", ""));

        let keys: Vec<String> = queue.objects().iter().map(|c| c.key().to_string()).collect();
        assert_eq!(keys, vec!["ns-a/b", "ns-a/z", "ns-b/a"]);
    }

    #[test]
    fn test_merge_later_wins() {
        let mut first = UpdateQueue::new();
        first.config_maps.upsert(config_map("ns", "gw", "old"));
        first.config_maps.upsert(config_map("ns", "other", "kept"));

        let mut later = UpdateQueue::new();
        later.config_maps.upsert(config_map("ns", "gw", "new"));
        later.gateway_class_statuses.upsert(StatusUpdate::new(
            ObjectKey::cluster("class"),
            GatewayClassStatus::default(),
        ));

        first.merge(later);
        assert_eq!(first.len(), 3);
        let gw = first.config_maps.get(&ObjectKey::new("ns", "gw")).unwrap();
        assert_eq!(gw.data.as_ref().unwrap().get("k").unwrap(), "new");
        assert!(!first.is_empty());
    }
}
