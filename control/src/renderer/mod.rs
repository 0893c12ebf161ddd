//! Render pipeline
//!
//! Turns a [`StoreSnapshot`] into the relay configuration, the relay
//! Deployment and Service, and Gateway API statuses for every GatewayClass
//! managed by this controller. A pass is a pure function of the snapshot
//! and the [`ControllerConfig`]: everything it produces is staged in an
//! [`UpdateQueue`] for the caller to apply.
//!
//! ## Flow per class
//! 1. Find the GatewayConfig named by the class `parametersRef`
//! 2. Render the auth section and look up the Dataplane (managed mode)
//! 3. Per gateway: listeners, attached routes, clusters, public address,
//!    document, manifests, status
//!
//! Class-level failures in steps 1-2 invalidate every gateway of the class;
//! a failure while rendering one gateway invalidates only that gateway.

pub mod address;
pub mod auth;
pub mod cluster;
pub mod deployment;
pub mod listener;
pub mod metadata;
pub mod relay_config;
pub mod route;
pub mod service;
pub mod status;

use crate::apis::gateway_config::TURNGATE_GROUP;
use crate::apis::metrics::{record_gateway_render, record_render_pass};
use crate::apis::status::{ConditionType, GatewayClassStatus, GatewayStatus, GatewayStatusAddress};
use crate::apis::{Dataplane, Gateway, GatewayClass, GatewayConfig, UDPRoute};
use crate::config::{ControllerConfig, DataplaneMode};
use crate::error::{CriticalError, RenderError};
use crate::store::{ObjectKey, StoreSnapshot, Stores};
use crate::update::{StatusUpdate, UpdateQueue};
use address::{find_owned_service, resolve_address, PublicAddress};
use cluster::{resolve_clusters, ClusterOptions};
use common::AuthConfig;
use kube::ResourceExt;
use listener::{resolve_listeners, ListenerResolution};
use metadata::{gateway_key, mixed_protocol_enabled};
use relay_config::{render_config_map, render_relay_config, RelayInputs};
use route::attach_routes;
use status::{reason, ConditionSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Per-class state that every gateway of the class renders against
struct ClassContext<'a> {
    class: &'a GatewayClass,
    config: Arc<GatewayConfig>,
    auth: AuthConfig,
    dataplane: Option<Arc<Dataplane>>,
}

/// Output of one class pass before route statuses are added
#[derive(Default)]
struct ClassOutput {
    queue: UpdateQueue,
    /// Listener states of every gateway rendered in the pass
    rendered: BTreeMap<ObjectKey, ListenerResolution>,
}

pub struct Renderer {
    stores: Arc<Stores>,
    config: ControllerConfig,
}

impl Renderer {
    pub fn new(stores: Arc<Stores>, config: ControllerConfig) -> Self {
        Self { stores, config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn cluster_options(&self) -> ClusterOptions {
        ClusterOptions {
            endpoint_discovery: self.config.enable_endpoint_discovery,
            relay_to_cluster_ip: self.config.relay_to_cluster_ip(),
            cluster_domain: self.config.cluster_domain.clone(),
        }
    }

    /// GatewayClasses whose `controllerName` is ours, in key order
    pub fn managed_classes(&self, snapshot: &StoreSnapshot) -> Vec<Arc<GatewayClass>> {
        snapshot
            .gateway_classes
            .iter()
            .filter(|class| class.spec.controller_name == self.config.controller_name)
            .collect()
    }

    /// Render every managed class
    pub fn render_all(&self) -> UpdateQueue {
        let snapshot = self.stores.snapshot();
        let classes = self.managed_classes(&snapshot);
        info!("Render pass over {} GatewayClass(es)", classes.len());

        let mut queue = UpdateQueue::new();
        let mut rendered = BTreeMap::new();
        for class in &classes {
            let output = self.render_class(class, &snapshot);
            queue.merge(output.queue);
            rendered.extend(output.rendered);
        }

        self.stage_route_statuses(&snapshot, &rendered, &mut queue);
        queue
    }

    /// Render a single class
    ///
    /// Route parents on gateways of other classes keep the entry already
    /// published in the route's status.
    pub fn render_for_class(&self, class: &GatewayClass) -> UpdateQueue {
        let snapshot = self.stores.snapshot();
        let mut output = self.render_class(class, &snapshot);
        self.stage_route_statuses(&snapshot, &output.rendered, &mut output.queue);
        output.queue
    }

    /// Publish empty configuration for every gateway of `class`
    pub fn invalidate_gateway_class(&self, class: &GatewayClass) -> UpdateQueue {
        let snapshot = self.stores.snapshot();
        let err = RenderError::Critical(CriticalError::InternalError(format!(
            "GatewayClass {} invalidated",
            class.name_any()
        )));
        let config = self.gateway_config_for(class, &snapshot).ok();

        let mut output = ClassOutput::default();
        for gateway in gateways_for_class(class, &snapshot) {
            let namespace = manifest_namespace(class, config.as_deref(), &gateway);
            self.invalidate_gateway(&gateway, config.as_deref(), &namespace, &err, &snapshot, &mut output);
        }
        self.stage_route_statuses(&snapshot, &output.rendered, &mut output.queue);
        output.queue
    }

    fn gateway_config_for(
        &self,
        class: &GatewayClass,
        snapshot: &StoreSnapshot,
    ) -> Result<Arc<GatewayConfig>, CriticalError> {
        let class_name = class.name_any();
        let missing = |why: String| CriticalError::NoGatewayConfig(format!("{}: {}", class_name, why));

        let params = class
            .spec
            .parameters_ref
            .as_ref()
            .ok_or_else(|| missing("no parametersRef".to_string()))?;
        if params.group != TURNGATE_GROUP || params.kind != "GatewayConfig" {
            return Err(missing(format!(
                "parametersRef must be {}/GatewayConfig, got {}/{}",
                TURNGATE_GROUP, params.group, params.kind
            )));
        }
        let namespace = params
            .namespace
            .clone()
            .ok_or_else(|| missing("parametersRef has no namespace".to_string()))?;

        let key = ObjectKey::new(namespace, &params.name);
        snapshot
            .gateway_configs
            .get(&key)
            .ok_or_else(|| missing(format!("GatewayConfig {} not found", key)))
    }

    fn class_context<'a>(
        &self,
        class: &'a GatewayClass,
        config: Arc<GatewayConfig>,
        snapshot: &StoreSnapshot,
    ) -> Result<ClassContext<'a>, CriticalError> {
        let auth = auth::render_auth(&config, snapshot)?;

        let dataplane = match self.config.dataplane_mode {
            DataplaneMode::Legacy => None,
            DataplaneMode::Managed => {
                let name = config.spec.dataplane_name();
                let dataplane = snapshot
                    .dataplanes
                    .get(&ObjectKey::cluster(name))
                    .ok_or_else(|| CriticalError::InvalidDataplane(name.to_string()))?;
                Some(dataplane)
            }
        };

        Ok(ClassContext {
            class,
            config,
            auth,
            dataplane,
        })
    }

    fn render_class(&self, class: &GatewayClass, snapshot: &StoreSnapshot) -> ClassOutput {
        let start = Instant::now();
        let class_name = class.name_any();
        let gateways = gateways_for_class(class, snapshot);
        let mut output = ClassOutput::default();
        debug!(
            "Rendering GatewayClass {} with {} gateway(s)",
            class_name,
            gateways.len()
        );

        let mut class_conditions = ConditionSet::new(class.metadata.generation);
        let config = match self.gateway_config_for(class, snapshot) {
            Ok(config) => {
                class_conditions.set(
                    ConditionType::Accepted,
                    true,
                    reason::ACCEPTED,
                    "GatewayClass is accepted",
                );
                config
            }
            Err(err) => {
                warn!("GatewayClass {}: {}", class_name, err);
                class_conditions.set(
                    ConditionType::Accepted,
                    false,
                    reason::INVALID_PARAMETERS,
                    err.to_string(),
                );
                stage_class_status(class, class_conditions, &mut output.queue);

                let err = RenderError::from(err);
                for gateway in &gateways {
                    let namespace = manifest_namespace(class, None, gateway);
                    self.invalidate_gateway(gateway, None, &namespace, &err, snapshot, &mut output);
                }
                record_render_pass(&class_name, start.elapsed().as_secs_f64(), "invalid");
                return output;
            }
        };
        stage_class_status(class, class_conditions, &mut output.queue);

        let ctx = match self.class_context(class, Arc::clone(&config), snapshot) {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!("GatewayClass {}: {}, invalidating its gateways", class_name, err);
                let err = RenderError::from(err);
                for gateway in &gateways {
                    let namespace = manifest_namespace(class, Some(config.as_ref()), gateway);
                    self.invalidate_gateway(
                        gateway,
                        Some(config.as_ref()),
                        &namespace,
                        &err,
                        snapshot,
                        &mut output,
                    );
                }
                record_render_pass(&class_name, start.elapsed().as_secs_f64(), "invalid");
                return output;
            }
        };

        let routes = snapshot.udp_routes.list();
        let mut result = "ok";
        for gateway in &gateways {
            if let Err(err) = self.render_gateway(&ctx, gateway, &routes, snapshot, &mut output) {
                error!("Gateway {}: {}, invalidating", gateway_key(gateway), err);
                let namespace = manifest_namespace(class, Some(ctx.config.as_ref()), gateway);
                self.invalidate_gateway(
                    gateway,
                    Some(ctx.config.as_ref()),
                    &namespace,
                    &RenderError::from(err),
                    snapshot,
                    &mut output,
                );
                result = "partial";
            }
        }

        info!(
            "Rendered GatewayClass {}: {} staged write(s) in {:?}",
            class_name,
            output.queue.len(),
            start.elapsed()
        );
        record_render_pass(&class_name, start.elapsed().as_secs_f64(), result);
        output
    }

    fn render_gateway(
        &self,
        ctx: &ClassContext<'_>,
        gateway: &Gateway,
        routes: &[Arc<UDPRoute>],
        snapshot: &StoreSnapshot,
        output: &mut ClassOutput,
    ) -> Result<(), CriticalError> {
        let key = gateway_key(gateway);
        let config = ctx.config.as_ref();
        let mixed = mixed_protocol_enabled(gateway, Some(config));

        let mut listeners = resolve_listeners(gateway, mixed);
        for finding in &listeners.findings {
            debug!("Gateway {}: {}", key, finding);
        }

        let attachments = attach_routes(gateway, &mut listeners, routes);
        let options = self.cluster_options();
        let mut clusters = Vec::new();
        for attachment in &attachments {
            let resolution = resolve_clusters(&attachment.route, snapshot, &options);
            for finding in &resolution.findings {
                debug!("Route {}: {}", attachment.key, finding);
            }
            if let Some(invalid) = resolution.findings.iter().find(|f| f.is_invalid_reference()) {
                for name in &attachment.listeners {
                    if let Some(listener) = listeners.get_mut(name) {
                        listener.set_unresolved_refs(invalid.to_string());
                    }
                }
            }
            if let Some(cluster) = resolution.cluster {
                clusters.push(cluster);
            }
        }

        let address: Option<PublicAddress> = match resolve_address(gateway, snapshot) {
            Ok(address) => Some(address),
            Err(err) => {
                debug!("Gateway {}: {}", key, err);
                None
            }
        };
        let owned_service = find_owned_service(gateway, snapshot);
        for listener in listeners.listeners.iter_mut() {
            listener.set_programmed(address.is_some());
        }

        let document = render_relay_config(RelayInputs {
            gateway,
            config,
            auth: ctx.auth.clone(),
            listeners: &listeners,
            attachments: &attachments,
            clusters,
            address: address.as_ref(),
            service: owned_service.as_deref(),
        });
        document
            .validate()
            .map_err(|e| CriticalError::RenderingError(format!("{}: {}", key, e)))?;
        let document = document
            .to_document()
            .map_err(|e| CriticalError::RenderingError(format!("{}: {}", key, e)))?;

        let namespace = manifest_namespace(ctx.class, Some(config), gateway);
        output
            .queue
            .config_maps
            .upsert(render_config_map(gateway, &namespace, document));
        if let Some(dataplane) = &ctx.dataplane {
            output
                .queue
                .deployments
                .upsert(deployment::render_deployment(gateway, &namespace, dataplane));
        }
        if let Some(service) = service::render_service(gateway, Some(config), &namespace, &listeners, mixed) {
            output.queue.services.upsert(service);
        }

        let programmed = listeners.has_accepted() && address.is_some();
        let mut conditions = ConditionSet::new(gateway.metadata.generation);
        conditions.set(
            ConditionType::Accepted,
            true,
            reason::ACCEPTED,
            "Gateway is accepted",
        );
        let (why, message) = if programmed {
            (reason::PROGRAMMED, "Gateway is programmed")
        } else if !listeners.has_accepted() {
            (reason::ADDRESS_NOT_ASSIGNED, "No listener is accepted")
        } else {
            (reason::ADDRESS_NOT_ASSIGNED, "No public address found")
        };
        conditions.set(ConditionType::Programmed, programmed, why, message);

        let status = GatewayStatus {
            addresses: address
                .iter()
                .map(|a| GatewayStatusAddress {
                    type_: a.address_type().to_string(),
                    value: a.addr.clone(),
                })
                .collect(),
            conditions: conditions.into_vec(),
            listeners: listeners.statuses(),
        };
        output
            .queue
            .gateway_statuses
            .upsert(StatusUpdate::new(key.clone(), status));

        info!(
            "Rendered Gateway {}: {} listener(s), {} route(s), programmed={}",
            key,
            listeners.accepted().count(),
            attachments.len(),
            programmed
        );
        record_gateway_render(&key.name, key.namespace.as_deref().unwrap_or_default(), "ok");
        output.rendered.insert(key, listeners);
        Ok(())
    }

    /// Stage the empty document and an invalid status for `gateway`
    fn invalidate_gateway(
        &self,
        gateway: &Gateway,
        config: Option<&GatewayConfig>,
        namespace: &str,
        err: &RenderError,
        snapshot: &StoreSnapshot,
        output: &mut ClassOutput,
    ) {
        let key = gateway_key(gateway);
        let routes = snapshot.udp_routes.list();
        let mut listeners = resolve_listeners(gateway, mixed_protocol_enabled(gateway, config));
        attach_routes(gateway, &mut listeners, &routes);
        for listener in listeners.listeners.iter_mut() {
            listener.set_invalid("Gateway configuration is invalid");
        }

        output
            .queue
            .config_maps
            .upsert(render_config_map(gateway, namespace, String::new()));

        let mut conditions = ConditionSet::new(gateway.metadata.generation);
        conditions
            .set(
                ConditionType::Accepted,
                true,
                reason::ACCEPTED,
                "Gateway is accepted",
            )
            .set(
                ConditionType::Programmed,
                false,
                reason::INVALID,
                err.to_string(),
            );
        let status = GatewayStatus {
            addresses: Vec::new(),
            conditions: conditions.into_vec(),
            listeners: listeners.statuses(),
        };
        output
            .queue
            .gateway_statuses
            .upsert(StatusUpdate::new(key.clone(), status));

        warn!("Invalidated Gateway {}: {}", key, err);
        record_gateway_render(&key.name, key.namespace.as_deref().unwrap_or_default(), "invalid");
        output.rendered.insert(key, listeners);
    }

    /// Stage route statuses for parents among `rendered` or missing gateways
    fn stage_route_statuses(
        &self,
        snapshot: &StoreSnapshot,
        rendered: &BTreeMap<ObjectKey, ListenerResolution>,
        queue: &mut UpdateQueue,
    ) {
        let options = self.cluster_options();
        for udp_route in snapshot.udp_routes.iter() {
            let clusters = resolve_clusters(&udp_route, snapshot, &options);
            let Some(status) = route::route_status(
                &udp_route,
                snapshot,
                rendered,
                &clusters,
                &self.config.controller_name,
            ) else {
                continue;
            };
            let Some(key) = ObjectKey::from_object(udp_route.as_ref()) else {
                continue;
            };
            queue.route_statuses.upsert(StatusUpdate::new(key, status));
        }
    }
}

/// Gateways whose `gatewayClassName` is `class`, in key order
pub fn gateways_for_class(class: &GatewayClass, snapshot: &StoreSnapshot) -> Vec<Arc<Gateway>> {
    let name = class.name_any();
    snapshot
        .gateways
        .iter()
        .filter(|gw| gw.spec.gateway_class_name == name)
        .collect()
}

/// Namespace rendered manifests live in
///
/// The GatewayConfig's namespace; without a config, the namespace named by
/// the class `parametersRef`, else the gateway's own.
pub fn manifest_namespace(
    class: &GatewayClass,
    config: Option<&GatewayConfig>,
    gateway: &Gateway,
) -> String {
    config
        .and_then(|c| c.namespace())
        .or_else(|| {
            class
                .spec
                .parameters_ref
                .as_ref()
                .and_then(|p| p.namespace.clone())
        })
        .or_else(|| gateway.namespace())
        .unwrap_or_default()
}

fn stage_class_status(class: &GatewayClass, conditions: ConditionSet, queue: &mut UpdateQueue) {
    queue.gateway_class_statuses.upsert(StatusUpdate::new(
        ObjectKey::cluster(class.name_any()),
        GatewayClassStatus {
            conditions: conditions.into_vec(),
        },
    ));
}
