//! Manifests shared by the render pipeline tests

/// Class, config and Dataplane in namespace `turngate`
pub const CLASS: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: GatewayClass
metadata:
  name: turngate
  generation: 1
spec:
  controllerName: turngate.io/gateway-operator
  parametersRef:
    group: turngate.io
    kind: GatewayConfig
    name: turngate-config
    namespace: turngate
---
apiVersion: turngate.io/v1
kind: GatewayConfig
metadata:
  name: turngate-config
  namespace: turngate
spec:
  realm: turngate.io
  authType: plaintext
  userName: user-1
  password: pass-1
  minPort: 10000
  maxPort: 20000
  dataplane: default
---
apiVersion: turngate.io/v1
kind: Dataplane
metadata:
  name: default
spec:
  image: turngate/turngated:latest
  command: ["turngated"]
  replicas: 2
"#;

/// Gateway with a UDP and a TCP listener, plus its load-balancer Service
pub const GATEWAY: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: udp-gateway
  namespace: turngate
  uid: udp-gateway-uid
  generation: 2
spec:
  gatewayClassName: turngate
  listeners:
  - name: udp-listener
    port: 3478
    protocol: TURN-UDP
  - name: tcp-listener
    port: 3479
    protocol: TURN-TCP
---
apiVersion: v1
kind: Service
metadata:
  name: udp-gateway
  namespace: turngate
  annotations:
    turngate.io/related-gateway: turngate/udp-gateway
  ownerReferences:
  - apiVersion: gateway.networking.k8s.io/v1
    kind: Gateway
    name: udp-gateway
    uid: udp-gateway-uid
spec:
  type: LoadBalancer
  ports:
  - name: udp-listener
    port: 3478
    protocol: UDP
  - name: tcp-listener
    port: 3479
    protocol: TCP
status:
  loadBalancer:
    ingress:
    - ip: 1.2.3.4
"#;

/// Route on the UDP listener only, backed by `media-server`
pub const ROUTE: &str = r#"
apiVersion: turngate.io/v1
kind: UDPRoute
metadata:
  name: media-plane
  namespace: turngate
  generation: 1
spec:
  parentRefs:
  - name: udp-gateway
    sectionName: udp-listener
  rules:
  - backendRefs:
    - name: media-server
"#;

/// Backend Service with a ClusterIP and four ready endpoints
pub const BACKEND: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: media-server
  namespace: turngate
spec:
  clusterIP: 10.96.0.10
  ports:
  - name: media
    port: 9001
    protocol: UDP
---
apiVersion: discovery.k8s.io/v1
kind: EndpointSlice
metadata:
  name: media-server-x7k2p
  namespace: turngate
  labels:
    kubernetes.io/service-name: media-server
addressType: IPv4
endpoints:
- addresses: ["10.244.0.1"]
  conditions:
    ready: true
- addresses: ["10.244.0.2"]
  conditions:
    ready: true
- addresses: ["10.244.1.1"]
  conditions:
    ready: true
- addresses: ["10.244.1.2"]
  conditions:
    ready: true
"#;

/// Gateway whose second listener reuses the first one's port
pub const CONFLICTED_GATEWAY: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: udp-gateway
  namespace: turngate
  uid: udp-gateway-uid
  generation: 3
spec:
  gatewayClassName: turngate
  listeners:
  - name: udp-listener
    port: 3478
    protocol: TURN-UDP
  - name: tcp-listener
    port: 3478
    protocol: TURN-TCP
"#;

/// Plaintext config without a password
pub const BROKEN_CONFIG: &str = r#"
apiVersion: turngate.io/v1
kind: GatewayConfig
metadata:
  name: turngate-config
  namespace: turngate
spec:
  authType: plaintext
  userName: user-1
"#;

/// Second class with its own config in namespace `edge`, one Gateway, and
/// a route attached to Gateways of both classes
pub const SECOND_CLASS: &str = r#"
apiVersion: gateway.networking.k8s.io/v1
kind: GatewayClass
metadata:
  name: turngate-edge
  generation: 1
spec:
  controllerName: turngate.io/gateway-operator
  parametersRef:
    group: turngate.io
    kind: GatewayConfig
    name: edge-config
    namespace: edge
---
apiVersion: turngate.io/v1
kind: GatewayConfig
metadata:
  name: edge-config
  namespace: edge
spec:
  authType: longterm
  sharedSecret: s3cr3t
---
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: edge-gateway
  namespace: turngate
  uid: edge-gateway-uid
  generation: 1
spec:
  gatewayClassName: turngate-edge
  listeners:
  - name: dtls-listener
    port: 5349
    protocol: TURN-DTLS
---
apiVersion: turngate.io/v1
kind: UDPRoute
metadata:
  name: shared-plane
  namespace: turngate
  generation: 1
spec:
  parentRefs:
  - name: udp-gateway
  - name: edge-gateway
  rules:
  - backendRefs:
    - name: media-server
"#;

/// Route naming a Gateway that does not exist
pub const ORPHAN_ROUTE: &str = r#"
apiVersion: turngate.io/v1
kind: UDPRoute
metadata:
  name: orphan
  namespace: turngate
  generation: 1
spec:
  parentRefs:
  - name: no-such-gateway
  rules:
  - backendRefs:
    - name: media-server
"#;
