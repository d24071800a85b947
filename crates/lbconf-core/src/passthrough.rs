//! Switching routing rules between HTTP mode and SSL passthrough.

use lbconf_api::{parse_bool, Backend, Mode, RoutingPath, Status};

use crate::{Key, Scopes};

/// Switch a routing rule and its backend between HTTP mode and SSL
/// passthrough.
///
/// Only re-evaluated when the `ssl-passthrough` annotation or the rule itself
/// changed, or when the backend was just created. A removed or missing
/// annotation means passthrough is disabled. A malformed value is logged and
/// leaves the rule and backend alone.
///
/// Rules that point at TCP services or the default backend never switch.
///
/// Returns `true` only when the rule actually switched modes. A new backend
/// that is already on the right side of the switch still gets its mode
/// aligned, but that doesn't count as a switch.
pub fn handle_ssl_passthrough(
    scopes: &Scopes<'_>,
    path: &mut RoutingPath,
    backend: &mut Backend,
    new_backend: bool,
) -> bool {
    if !path.supports_passthrough() {
        return false;
    }

    let annotation = scopes.resolve(Key::SslPassthrough);
    let status = match annotation {
        Some(a) if !a.status.is_unchanged() => a.status,
        _ => path.status,
    };
    if status == Status::Unchanged && !new_backend {
        return false;
    }

    let enabled = match annotation {
        None => false,
        Some(a) if a.status.is_removed() => false,
        Some(a) => match parse_bool(&a.value) {
            Ok(enabled) => enabled,
            Err(error) => {
                let error = error.with_field(Key::SslPassthrough.as_str());
                tracing::error!(
                    service = %path.service,
                    backend = %backend.name,
                    value = %a.value,
                    %error,
                    "invalid ssl-passthrough annotation",
                );
                return false;
            }
        },
    };

    let mode = if enabled { Mode::Tcp } else { Mode::Http };
    if enabled == path.is_ssl_passthrough {
        if new_backend {
            backend.mode = mode;
        }
        return false;
    }

    path.is_ssl_passthrough = enabled;
    backend.mode = mode;
    tracing::debug!(
        service = %path.service,
        backend = %backend.name,
        %mode,
        enabled,
        "switched ssl passthrough",
    );
    true
}
