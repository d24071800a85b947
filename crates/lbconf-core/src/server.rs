//! Applying member-level annotations to [Server]s.
//!
//! Server annotations are resolved once per service with
//! [resolve_server_annotations] and then applied to each member of the pool
//! with [configure_server]. Servers are cheap to rebuild, so every resolved
//! annotation is reapplied every time, whether or not it changed. Use
//! [ServerAnnotations::is_active] to skip the whole pool when nothing did.

use std::collections::BTreeMap;

use lbconf_api::Server;

use crate::keys::{Applied, Setting};
use crate::{AnnotationValue, Key, Scopes};

/// Every key that applies to a [Server].
pub const SERVER_KEYS: &[Key] = &[
    Key::CookiePersistence,
    Key::Check,
    Key::CheckInterval,
    Key::PodMaxconn,
    Key::ServerSsl,
    Key::SendProxyProtocol,
];

type ServerSetting = Setting<Server, ()>;

fn server_settings() -> [ServerSetting; 6] {
    [
        ServerSetting::new(Key::CookiePersistence, |s, v, _| {
            s.cookie = v.to_string();
            Ok(())
        })
        .clears(|s| s.cookie.clear()),
        ServerSetting::new(Key::Check, |s, v, _| s.update_check(v)).clears(|s| {
            s.check = false;
            s.check_port = None;
        }),
        ServerSetting::new(Key::CheckInterval, |s, v, _| s.update_inter(v))
            .clears(|s| s.inter = None),
        ServerSetting::new(Key::PodMaxconn, |s, v, _| s.update_maxconn(v))
            .clears(|s| s.maxconn = None),
        ServerSetting::new(Key::ServerSsl, |s, v, _| s.update_ssl(v)).clears(|s| s.ssl = false),
        ServerSetting::new(Key::SendProxyProtocol, |s, v, _| s.update_send_proxy(v))
            .clears(|s| s.send_proxy = false),
    ]
}

/// The member-level annotations for one service.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerAnnotations {
    values: BTreeMap<Key, AnnotationValue>,
    active: bool,
}

impl ServerAnnotations {
    /// `true` if any annotation changed or was removed since the last cycle.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn get(&self, key: Key) -> Option<&AnnotationValue> {
        self.values.get(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &AnnotationValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

/// Resolve every member-level annotation for a service.
///
/// `pod-maxconn` and `send-proxy-protocol` describe the pods themselves and
/// are only read from the service scope. Everything else follows the full
/// scope chain. Keys that aren't set anywhere are left out.
pub fn resolve_server_annotations(scopes: &Scopes<'_>) -> ServerAnnotations {
    let values: BTreeMap<_, _> = SERVER_KEYS
        .iter()
        .filter_map(|&key| scopes.resolve(key).map(|v| (key, v.clone())))
        .collect();

    let active = values.values().any(|v| !v.status.is_unchanged());

    ServerAnnotations { values, active }
}

/// Apply member-level annotations to one server.
///
/// Removed annotations reset their field to unset, or `false` for flags.
/// Invalid values are logged and skipped. Returns `true` if any field was set
/// or cleared.
pub fn configure_server(server: &mut Server, annotations: &ServerAnnotations) -> bool {
    let mut applied = false;

    for setting in server_settings() {
        let Some(value) = annotations.get(setting.key) else {
            continue;
        };

        tracing::trace!(server = %server.name, key = %setting.key, "configuring annotation");
        match setting.apply_value(server, value, &()) {
            Applied::Set | Applied::Cleared => applied = true,
            Applied::Failed(error) => {
                tracing::error!(
                    server = %server.name,
                    key = %setting.key,
                    value = %value.value,
                    %error,
                    "failed to apply annotation",
                );
            }
        }
    }

    applied
}
