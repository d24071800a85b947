//! Routing rules.

use serde::{Deserialize, Serialize};

use crate::Status;

/// One rule within a routing resource, pointing at a single backend.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingPath {
    /// The matched path prefix. Empty for catch-all rules.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// The name of the service this rule sends traffic to.
    pub service: String,

    /// The service port this rule sends traffic to.
    pub port: u16,

    /// Traffic for this rule is forwarded still encrypted, over TCP.
    #[serde(default)]
    pub is_ssl_passthrough: bool,

    /// The service only speaks TCP. These rules never use HTTP mode.
    #[serde(default)]
    pub is_tcp_service: bool,

    /// This rule is the catch-all default backend.
    #[serde(default)]
    pub is_default_backend: bool,

    /// How this rule changed since the last reconciliation cycle.
    #[serde(default)]
    pub status: Status,
}

impl RoutingPath {
    /// Whether this rule can switch between HTTP and SSL passthrough.
    pub fn supports_passthrough(&self) -> bool {
        !(self.is_tcp_service || self.is_default_backend)
    }
}
