//! Load-balancer Service exposing the relay listeners

use crate::apis::{Gateway, GatewayConfig};
use crate::renderer::listener::ListenerResolution;
use crate::renderer::metadata::{
    controller_annotations, controller_labels, gateway_key, gateway_owner_reference,
    selector_labels, service_type_override, MetadataMerge, MetadataSource,
};
use common::ProtocolClass;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const DEFAULT_SERVICE_TYPE: &str = "LoadBalancer";
const SERVICE_TYPES: [&str; 3] = ["LoadBalancer", "NodePort", "ClusterIP"];

/// Cloud health-check annotation pairs: (port key, protocol key)
pub const HEALTH_CHECK_ANNOTATIONS: [(&str, &str); 2] = [
    (
        "service.beta.kubernetes.io/aws-load-balancer-healthcheck-port",
        "service.beta.kubernetes.io/aws-load-balancer-healthcheck-protocol",
    ),
    (
        "service.beta.kubernetes.io/do-loadbalancer-healthcheck-port",
        "service.beta.kubernetes.io/do-loadbalancer-healthcheck-protocol",
    ),
];

const HEALTH_CHECK_PORT_NAME: &str = "tcp-healthcheck";

/// Service type requested through annotations, default LoadBalancer
pub fn service_type(gateway: &Gateway, config: Option<&GatewayConfig>) -> String {
    match service_type_override(gateway, config) {
        Some(t) if SERVICE_TYPES.contains(&t.as_str()) => t,
        Some(t) => {
            warn!(
                "Gateway {}: unknown service type {:?}, using {}",
                gateway_key(gateway),
                t,
                DEFAULT_SERVICE_TYPE
            );
            DEFAULT_SERVICE_TYPE.to_string()
        }
        None => DEFAULT_SERVICE_TYPE.to_string(),
    }
}

/// One port per accepted listener, deduplicated by (port, protocol)
fn listener_ports(listeners: &ListenerResolution, mixed_protocol: bool) -> Vec<ServicePort> {
    let mut first_class: Option<ProtocolClass> = None;
    let mut ports: Vec<ServicePort> = Vec::new();

    for listener in listeners.accepted() {
        let Some(class) = listener.class() else {
            continue;
        };
        let first = *first_class.get_or_insert(class);
        if !mixed_protocol && class != first {
            debug!(
                "Listener {} skipped on the Service: {} differs from {} without mixed-protocol",
                listener.name, class, first
            );
            continue;
        }

        let protocol = class.service_protocol();
        let duplicate = ports
            .iter()
            .any(|p| p.port == listener.port && p.protocol.as_deref() == Some(protocol));
        if duplicate {
            continue;
        }
        ports.push(ServicePort {
            name: Some(listener.name.clone()),
            protocol: Some(protocol.to_string()),
            port: listener.port,
            ..Default::default()
        });
    }
    ports
}

/// TCP port requested by a health-check annotation pair, if any
fn health_check_port(gateway: &Gateway, annotations: &BTreeMap<String, String>) -> Option<ServicePort> {
    for (port_key, protocol_key) in HEALTH_CHECK_ANNOTATIONS {
        let Some(port) = annotations.get(port_key) else {
            continue;
        };
        let protocol = annotations.get(protocol_key).map(String::as_str).unwrap_or("TCP");
        if protocol.eq_ignore_ascii_case("UDP") {
            debug!("Gateway {}: UDP health check needs no extra port", gateway_key(gateway));
            continue;
        }
        match port.parse::<i32>() {
            Ok(port) => {
                return Some(ServicePort {
                    name: Some(HEALTH_CHECK_PORT_NAME.to_string()),
                    protocol: Some("TCP".to_string()),
                    port,
                    ..Default::default()
                })
            }
            Err(_) => warn!(
                "Gateway {}: health-check port {:?} in {} is not a number",
                gateway_key(gateway),
                port,
                port_key
            ),
        }
    }
    None
}

/// First IP address hint of the gateway, untyped entries count as IPs
fn address_hint(gateway: &Gateway) -> Option<String> {
    gateway
        .spec
        .addresses
        .as_ref()?
        .iter()
        .find(|a| a.r#type.as_deref().map_or(true, |t| t == "IPAddress"))
        .map(|a| a.value.clone())
}

/// Service for `gateway`, `None` when no listener is accepted
pub fn render_service(
    gateway: &Gateway,
    config: Option<&GatewayConfig>,
    namespace: &str,
    listeners: &ListenerResolution,
    mixed_protocol: bool,
) -> Option<Service> {
    let mut ports = listener_ports(listeners, mixed_protocol);
    if ports.is_empty() {
        return None;
    }

    let annotations = MetadataMerge::new()
        .layer(MetadataSource::ControllerOwned, controller_annotations(gateway))
        .layer(
            MetadataSource::GatewayConfig,
            config.map(|c| c.spec.lb_annotations()).unwrap_or_default(),
        )
        .layer(MetadataSource::Gateway, gateway.annotations().clone())
        .merge();

    if let Some(hc) = health_check_port(gateway, &annotations) {
        let exists = ports
            .iter()
            .any(|p| p.port == hc.port && p.protocol.as_deref() == Some("TCP"));
        if !exists {
            ports.push(hc);
        }
    }

    let hint = address_hint(gateway);

    Some(Service {
        metadata: ObjectMeta {
            name: Some(gateway.name_any()),
            namespace: Some(namespace.to_string()),
            labels: Some(controller_labels(gateway)),
            annotations: Some(annotations),
            owner_references: gateway_owner_reference(gateway).map(|o| vec![o]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type(gateway, config)),
            selector: Some(selector_labels(gateway)),
            ports: Some(ports),
            load_balancer_ip: hint.clone(),
            external_ips: hint.map(|ip| vec![ip]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::renderer::listener::resolve_listeners;
    use crate::renderer::metadata::{
        mixed_protocol_enabled, MIXED_PROTOCOL_ANNOTATION, OWNED_BY_LABEL,
        RELATED_GATEWAY_ANNOTATION, SERVICE_TYPE_ANNOTATION,
    };
    use crate::test_fixtures::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn render(gw: &Gateway, config: &GatewayConfig) -> Option<Service> {
        let mixed = mixed_protocol_enabled(gw, Some(config));
        let listeners = resolve_listeners(gw, mixed);
        render_service(gw, Some(config), NAMESPACE, &listeners, mixed)
    }

    fn ports(svc: &Service) -> Vec<(String, i32)> {
        svc.spec
            .as_ref()
            .unwrap()
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| (p.protocol.clone().unwrap(), p.port))
            .collect()
    }

    fn with_config_annotations(entries: &[(&str, &str)]) -> GatewayConfig {
        let mut config = gateway_config();
        config.spec.load_balancer_service_annotations = Some(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        config
    }

    #[test]
    fn test_single_listener() {
        let gw = gateway_with_listeners(&[("gateway-1-listener-udp", 1, "UDP")]);
        let svc = render(&gw, &gateway_config()).unwrap();

        assert_eq!(svc.namespace().as_deref(), Some(NAMESPACE));
        assert_eq!(svc.labels().len(), 3);
        assert!(svc.labels().contains_key(OWNED_BY_LABEL));
        assert_eq!(svc.annotations().len(), 1);
        assert_eq!(
            svc.annotations().get(RELATED_GATEWAY_ANNOTATION).unwrap(),
            "testnamespace/gateway-1"
        );

        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        let port = &spec.ports.as_ref().unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("gateway-1-listener-udp"));
        assert_eq!(port.protocol.as_deref(), Some("UDP"));
        assert_eq!(port.port, 1);
    }

    #[test]
    fn test_no_valid_listener() {
        let gw = gateway_with_listeners(&[("dummy", 1, "dummy")]);
        assert!(render(&gw, &gateway_config()).is_none(), "no Service without listeners");
    }

    #[test]
    fn test_multi_listener_single_protocol() {
        let gw = gateway_with_listeners(&[
            ("udp-1", 1, "TURN-UDP"),
            ("udp-2", 2, "TURN-DTLS"),
        ]);
        let svc = render(&gw, &gateway_config()).unwrap();
        assert_eq!(ports(&svc), vec![("UDP".to_string(), 1), ("UDP".to_string(), 2)]);
    }

    #[test]
    fn test_multi_protocol_keeps_first_class() {
        let svc = render(&gateway(), &gateway_config()).unwrap();
        assert_eq!(
            ports(&svc),
            vec![("UDP".to_string(), 1)],
            "TCP listener dropped without mixed-protocol"
        );
    }

    #[rstest]
    #[case("true", 2)]
    #[case("dummy", 1)]
    fn test_mixed_protocol_annotation_on_gateway(#[case] value: &str, #[case] expected: usize) {
        let mut gw = gateway();
        gw.metadata.annotations = Some(
            [(MIXED_PROTOCOL_ANNOTATION.to_string(), value.to_string())].into(),
        );
        let svc = render(&gw, &gateway_config()).unwrap();
        assert_eq!(ports(&svc).len(), expected);
    }

    #[test]
    fn test_mixed_protocol_in_config_overridden_by_gateway() {
        let config = with_config_annotations(&[(MIXED_PROTOCOL_ANNOTATION, "true")]);
        assert_eq!(ports(&render(&gateway(), &config).unwrap()).len(), 2);

        let mut gw = gateway();
        gw.metadata.annotations = Some(
            [(MIXED_PROTOCOL_ANNOTATION.to_string(), "false".to_string())].into(),
        );
        assert_eq!(ports(&render(&gw, &config).unwrap()).len(), 1);
    }

    #[test]
    fn test_lb_annotations_merge() {
        let config = with_config_annotations(&[("someannotation", "from-config"), ("other", "x")]);
        let mut gw = gateway();
        gw.metadata.annotations = Some(
            [("someannotation".to_string(), "from-gateway".to_string())].into(),
        );

        let svc = render(&gw, &config).unwrap();
        let annotations = svc.annotations();
        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations.get("someannotation").unwrap(), "from-gateway");
        assert_eq!(annotations.get("other").unwrap(), "x");
    }

    #[rstest]
    #[case(HEALTH_CHECK_ANNOTATIONS[0], "8080", "HTTP", Some(8080))]
    #[case(HEALTH_CHECK_ANNOTATIONS[1], "8080", "HTTP", Some(8080))]
    #[case(HEALTH_CHECK_ANNOTATIONS[1], "eighty", "HTTP", None)]
    #[case(HEALTH_CHECK_ANNOTATIONS[1], "8080", "UDP", None)]
    fn test_health_check_annotations(
        #[case] keys: (&str, &str),
        #[case] port: &str,
        #[case] protocol: &str,
        #[case] expected: Option<i32>,
    ) {
        let config = with_config_annotations(&[(keys.0, port), (keys.1, protocol)]);
        let svc = render(&gateway(), &config).unwrap();

        assert_eq!(svc.annotations().len(), 3, "annotations are copied verbatim");
        let mut want = vec![("UDP".to_string(), 1)];
        if let Some(p) = expected {
            want.push(("TCP".to_string(), p));
        }
        assert_eq!(ports(&svc), want);
    }

    #[test]
    fn test_health_check_from_gateway_overrides_config() {
        let (port_key, protocol_key) = HEALTH_CHECK_ANNOTATIONS[0];
        let config = with_config_annotations(&[(port_key, "8080"), (protocol_key, "HTTP")]);
        let mut gw = gateway();
        gw.metadata.annotations = Some([(port_key.to_string(), "9090".to_string())].into());

        let svc = render(&gw, &config).unwrap();
        assert_eq!(
            ports(&svc),
            vec![("UDP".to_string(), 1), ("TCP".to_string(), 9090)]
        );
    }

    #[rstest]
    #[case(None, None, "LoadBalancer")]
    #[case(Some("ClusterIP"), None, "ClusterIP")]
    #[case(Some("NodePort"), None, "NodePort")]
    #[case(None, Some("NodePort"), "NodePort")]
    #[case(Some("NodePort"), Some("ClusterIP"), "ClusterIP")]
    #[case(None, Some("Bogus"), "LoadBalancer")]
    fn test_service_type(
        #[case] from_config: Option<&str>,
        #[case] from_gateway: Option<&str>,
        #[case] expected: &str,
    ) {
        let config = match from_config {
            Some(t) => with_config_annotations(&[(SERVICE_TYPE_ANNOTATION, t)]),
            None => gateway_config(),
        };
        let mut gw = gateway();
        if let Some(t) = from_gateway {
            gw.metadata.annotations =
                Some([(SERVICE_TYPE_ANNOTATION.to_string(), t.to_string())].into());
        }
        let svc = render(&gw, &config).unwrap();
        assert_eq!(svc.spec.unwrap().type_.as_deref(), Some(expected));
    }

    #[test]
    fn test_public_address_hint() {
        let mut gw: Gateway = gateway();
        gw.spec.addresses = Some(
            serde_json::from_value(serde_json::json!([
                {"type": "IPAddress", "value": "1.1.1.1"},
                {"type": "IPAddress", "value": "1.2.3.4"}
            ]))
            .unwrap(),
        );
        let spec = render(&gw, &gateway_config()).unwrap().spec.unwrap();
        assert_eq!(spec.load_balancer_ip.as_deref(), Some("1.1.1.1"));
        assert_eq!(spec.external_ips, Some(vec!["1.1.1.1".to_string()]));
    }

    #[test]
    fn test_selector_labels() {
        let svc = render(&gateway(), &gateway_config()).unwrap();
        assert_eq!(svc.spec.unwrap().selector, Some(selector_labels(&gateway())));
    }
}
