use thiserror::Error;

/// Errors that abort rendering for a gateway or a whole class
///
/// A critical error never aborts the pass: it switches the affected gateways
/// to the invalidation flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriticalError {
    #[error("invalid authentication type: {0}")]
    InvalidAuthType(String),

    #[error("missing username and/or password for plaintext authentication")]
    InvalidUsernamePassword,

    #[error("missing shared-secret for longterm authentication")]
    InvalidSharedSecret,

    #[error("missing Dataplane resource for Gateway: {0}")]
    InvalidDataplane(String),

    #[error("no GatewayConfig found for GatewayClass: {0}")]
    NoGatewayConfig(String),

    #[error("cannot find Secret for external authentication credentials: {0}")]
    ExternalAuthCredentialsNotFound(String),

    #[error("invalid authentication configuration: {0}")]
    InvalidAuthConfig(String),

    #[error("rendering error: {0}")]
    RenderingError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Errors reported on a listener, route or gateway status
///
/// Rendering continues for everything else on the same gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NonCriticalError {
    #[error("invalid Group in backend reference (expecting: core): {0}")]
    InvalidBackendGroup(String),

    #[error("invalid Kind in backend reference (expecting: Service): {0}")]
    InvalidBackendKind(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("no ClusterIP found for Service (this is fine for headless Services): {0}")]
    ClusterIPNotFound(String),

    #[error("no Endpoints found for Service: {0}")]
    EndpointNotFound(String),

    #[error("inconsistent cluster type for backends: {0}")]
    InconsistentClusterType(String),

    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("port unavailable: {0}")]
    PortUnavailable(String),

    #[error("no public address found for gateway: {0}")]
    PublicAddressNotFound(String),
}

impl NonCriticalError {
    /// Backend reference errors caused by group/kind rather than lookup
    pub fn is_invalid_reference(&self) -> bool {
        matches!(
            self,
            NonCriticalError::InvalidBackendGroup(_) | NonCriticalError::InvalidBackendKind(_)
        )
    }

    /// Errors meaning a backend could not be found at all
    pub fn is_missing_backend(&self) -> bool {
        matches!(self, NonCriticalError::ServiceNotFound(_))
    }
}

/// Any error produced by a render pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error(transparent)]
    Critical(#[from] CriticalError),

    #[error(transparent)]
    NonCritical(#[from] NonCriticalError),
}

impl RenderError {
    #[cfg(test)]
    pub fn is_critical(&self) -> bool {
        matches!(self, RenderError::Critical(_))
    }
}

impl From<common::ConfigError> for CriticalError {
    fn from(err: common::ConfigError) -> Self {
        use common::ConfigError;
        match err {
            ConfigError::InvalidAuthType(t) => CriticalError::InvalidAuthType(t),
            ConfigError::MissingUsernamePassword => CriticalError::InvalidUsernamePassword,
            ConfigError::MissingSharedSecret => CriticalError::InvalidSharedSecret,
            other => CriticalError::RenderingError(other.to_string()),
        }
    }
}
