//! Applying pool-level annotations to a [Backend].

use lbconf_api::{Backend, Mode, Status};

use crate::cookie::{resolve_cookie, COOKIE_KEYS};
use crate::keys::{Applied, Setting};
use crate::{AnnotationValue, Key, Scopes};

fn http_only(backend: &Backend) -> bool {
    backend.mode == Mode::Http
}

type BackendSetting<'s> = Setting<Backend, Scopes<'s>>;

/// Backend keys, in the order they're applied.
fn backend_settings<'s>() -> [BackendSetting<'s>; 6] {
    [
        BackendSetting::new(Key::AbortOnClose, |b, v, _| b.update_abort_on_close(v))
            .clears(|b| b.abort_on_close = false),
        BackendSetting::new(Key::CookiePersistence, |b, _, scopes| {
            b.update_cookie(resolve_cookie(scopes))
        })
        .clears(|b| b.cookie = None),
        BackendSetting::new(Key::LoadBalance, |b, v, _| b.update_balance(v))
            .clears(|b| b.balance = None),
        BackendSetting::new(Key::TimeoutCheck, |b, v, _| b.update_check_timeout(v))
            .clears(|b| b.check_timeout = None),
        BackendSetting::new(Key::CheckHttp, |b, v, _| b.update_httpchk(v))
            .clears(|b| b.httpchk = None)
            .only_if(http_only),
        BackendSetting::new(Key::ForwardedFor, |b, v, _| b.update_forwarded_for(v))
            .clears(|b| b.forwarded_for = false)
            .only_if(http_only),
    ]
}

/// Apply backend-level annotations to `backend`.
///
/// On a backend that already existed, annotations that haven't changed since
/// the last cycle are skipped entirely. A backend created this cycle has
/// nothing to inherit, so every annotation that resolves is applied, except
/// removed ones, which have nothing to clear. `check-http` and
/// `forwarded-for` only apply to HTTP mode backends.
///
/// A removed annotation resets its field to unset, or `false` for flags.
/// Invalid values are logged and skipped without touching the backend.
/// Returns `true` if any field was set or cleared.
pub fn configure_backend(backend: &mut Backend, scopes: &Scopes<'_>, new_backend: bool) -> bool {
    let mut active = false;

    for setting in backend_settings() {
        if !setting.applies_to(backend) {
            continue;
        }
        let Some(value) = scopes.resolve(setting.key) else {
            continue;
        };

        let status = match setting.key {
            Key::CookiePersistence => cookie_status(value, scopes),
            _ => value.status,
        };
        match status {
            Status::Unchanged if !new_backend => continue,
            Status::Removed if new_backend => continue,
            _ => (),
        }

        tracing::debug!(backend = %backend.name, key = %setting.key, "configuring annotation");
        match setting.apply_value(backend, value, scopes) {
            Applied::Set | Applied::Cleared => active = true,
            Applied::Failed(error) => {
                tracing::error!(
                    backend = %backend.name,
                    key = %setting.key,
                    value = %value.value,
                    %error,
                    "failed to apply annotation",
                );
            }
        }
    }

    active
}

// the cookie is rebuilt from all of its keys, so a change to any of them
// counts as a change to the cookie. removing the cookie name always wins.
fn cookie_status(persistence: &AnnotationValue, scopes: &Scopes<'_>) -> Status {
    if !persistence.status.is_unchanged() {
        return persistence.status;
    }

    let any_changed = COOKIE_KEYS
        .iter()
        .filter_map(|key| scopes.resolve(*key))
        .any(|v| !v.status.is_unchanged());

    if any_changed {
        Status::Changed
    } else {
        Status::Unchanged
    }
}

#[cfg(test)]
mod test {
    use lbconf_api::{Balance, Cookie, Duration, Httpchk};
    use tracing_test::traced_test;

    use super::*;
    use crate::AnnotationSource;

    macro_rules! source {
        ($($k:expr => $v:expr),* $(,)*) => {{
            let mut source = AnnotationSource::new();
            $(
                source.insert($k, $v);
            )*
            source
        }}
    }

    fn configured(mode: Mode) -> Backend {
        let mut backend = Backend::new("default-app-80", mode);
        backend.update_balance("roundrobin").unwrap();
        backend.update_abort_on_close("true").unwrap();
        backend.update_httpchk("GET /healthz").unwrap();
        backend
            .update_cookie(Cookie {
                name: "SRV".to_string(),
                ..Default::default()
            })
            .unwrap();
        backend
    }

    fn everything(value: fn(&'static str) -> AnnotationValue) -> AnnotationSource {
        source! {
            "abort-on-close" => value("false"),
            "cookie-persistence" => value("SESSION"),
            "cookie-domain" => value("a.com"),
            "load-balance" => value("leastconn"),
            "timeout-check" => value("3s"),
            "check-http" => value("/ready"),
            "forwarded-for" => value("true"),
        }
    }

    #[test]
    fn test_unchanged_existing_backend_is_skipped() {
        let service = everything(AnnotationValue::unchanged);
        let empty = AnnotationSource::new();
        let global = AnnotationSource::defaults();

        let mut backend = configured(Mode::Http);
        let before = backend.clone();

        assert!(!configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &global),
            false
        ));
        assert_eq!(backend, before);
    }

    #[test]
    fn test_new_backend_applies_unchanged_values() {
        let service = everything(AnnotationValue::unchanged);
        let empty = AnnotationSource::new();

        let mut backend = Backend::new("default-app-80", Mode::Http);
        assert!(configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            true
        ));

        assert_eq!(
            backend,
            Backend {
                name: "default-app-80".to_string(),
                mode: Mode::Http,
                balance: Some(Balance::LeastConn),
                httpchk: Some(Httpchk {
                    method: None,
                    uri: "/ready".to_string(),
                    version: None,
                }),
                check_timeout: Some(Duration::from_secs(3)),
                forwarded_for: true,
                abort_on_close: false,
                cookie: Some(Cookie {
                    name: "SESSION".to_string(),
                    domains: vec!["a.com".to_string()],
                    ..Default::default()
                }),
            }
        );
    }

    #[test]
    fn test_new_backend_ignores_keys_set_nowhere() {
        let empty = AnnotationSource::new();

        let mut backend = Backend::new("default-app-80", Mode::Http);
        assert!(!configure_backend(
            &mut backend,
            &Scopes::new(&empty, &empty, &empty),
            true
        ));
        assert_eq!(backend, Backend::new("default-app-80", Mode::Http));
    }

    #[test]
    fn test_new_backend_with_defaults() {
        let empty = AnnotationSource::new();
        let global = AnnotationSource::defaults();

        let mut backend = Backend::new("default-app-80", Mode::Http);
        assert!(configure_backend(
            &mut backend,
            &Scopes::new(&empty, &empty, &global),
            true
        ));
        assert_eq!(backend.balance, Some(Balance::RoundRobin));
        assert!(backend.forwarded_for);
    }

    #[test]
    fn test_removed_cookie_clears() {
        let service = source! { "cookie-persistence" => AnnotationValue::removed("SRV") };
        let empty = AnnotationSource::new();

        let mut backend = configured(Mode::Http);
        assert!(configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            false
        ));
        assert_eq!(backend.cookie, None);
    }

    #[test]
    fn test_removed_on_new_backend_is_a_no_op() {
        let service = source! {
            "cookie-persistence" => AnnotationValue::removed("SRV"),
            "check-http" => AnnotationValue::removed("/healthz"),
            "load-balance" => AnnotationValue::removed("source"),
        };
        let empty = AnnotationSource::new();

        let mut backend = Backend::new("default-app-80", Mode::Http);
        assert!(!configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            true
        ));
        assert_eq!(backend, Backend::new("default-app-80", Mode::Http));
    }

    #[test]
    fn test_removed_keys_reset_fields() {
        let service = source! {
            "load-balance" => AnnotationValue::removed("leastconn"),
            "abort-on-close" => AnnotationValue::removed("true"),
            "timeout-check" => AnnotationValue::removed("3s"),
            "forwarded-for" => AnnotationValue::removed("true"),
        };
        let empty = AnnotationSource::new();
        let global = AnnotationSource::defaults();

        let mut backend = configured(Mode::Http);
        backend.update_balance("leastconn").unwrap();
        backend.update_check_timeout("3s").unwrap();
        backend.update_forwarded_for("true").unwrap();

        assert!(configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &global),
            false
        ));
        assert_eq!(backend.balance, None);
        assert!(!backend.abort_on_close);
        assert_eq!(backend.check_timeout, None);
        assert!(!backend.forwarded_for);

        // fields the removed keys don't own are untouched
        assert!(backend.httpchk.is_some());
        assert!(backend.cookie.is_some());
    }

    #[test]
    fn test_removed_check_http_clears() {
        let service = source! { "check-http" => AnnotationValue::removed("GET /healthz") };
        let empty = AnnotationSource::new();

        let mut backend = configured(Mode::Http);
        assert!(configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            false
        ));
        assert_eq!(backend.httpchk, None);
    }

    #[test]
    fn test_cookie_sub_key_change_rebuilds_cookie() {
        let service = source! {
            "cookie-persistence" => AnnotationValue::unchanged("SRV"),
            "cookie-secure" => AnnotationValue::changed("true"),
        };
        let empty = AnnotationSource::new();

        let mut backend = configured(Mode::Http);
        assert!(configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            false
        ));
        assert_eq!(
            backend.cookie,
            Some(Cookie {
                name: "SRV".to_string(),
                secure: true,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_tcp_mode_skips_http_keys() {
        let service = everything(AnnotationValue::changed);
        let empty = AnnotationSource::new();

        let mut backend = configured(Mode::Tcp);
        backend.forwarded_for = false;
        assert!(configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            false
        ));

        // untouched http-only settings
        assert_eq!(backend.httpchk, Some("GET /healthz".parse::<Httpchk>().unwrap()));
        assert!(!backend.forwarded_for);

        // everything else applies
        assert_eq!(backend.balance, Some(Balance::LeastConn));
        assert!(!backend.abort_on_close);
    }

    #[test]
    #[traced_test]
    fn test_invalid_value_is_isolated() {
        let service = source! {
            "load-balance" => AnnotationValue::changed("bogus"),
            "abort-on-close" => AnnotationValue::changed("true"),
        };
        let empty = AnnotationSource::new();

        let mut backend = Backend::new("default-app-80", Mode::Http);
        backend.update_balance("source").unwrap();

        assert!(configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            false
        ));
        assert!(backend.abort_on_close);
        assert_eq!(backend.balance, Some(Balance::Source));
        assert!(logs_contain("load-balance"));
        assert!(logs_contain("failed to apply annotation"));
    }

    #[test]
    fn test_only_failures_is_not_active() {
        let service = source! {
            "load-balance" => AnnotationValue::changed("bogus"),
            "timeout-check" => AnnotationValue::changed("soon"),
        };
        let empty = AnnotationSource::new();

        let mut backend = Backend::new("default-app-80", Mode::Http);
        assert!(!configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            false
        ));
        assert_eq!(backend, Backend::new("default-app-80", Mode::Http));
    }

    #[test]
    fn test_invalid_cookie_keeps_previous() {
        let service = source! {
            "cookie-persistence" => AnnotationValue::changed("SESSION"),
            "cookie-type" => AnnotationValue::changed("append"),
        };
        let empty = AnnotationSource::new();

        let mut backend = configured(Mode::Http);
        let before = backend.cookie.clone();

        assert!(!configure_backend(
            &mut backend,
            &Scopes::new(&service, &empty, &empty),
            false
        ));
        assert_eq!(backend.cookie, before);
    }
}
