//! Building persistence cookies from the `cookie-*` annotations.

use lbconf_api::{parse_bool, Cookie, Error};

use crate::{Key, Scopes};

/// Every key that contributes to a persistence [Cookie].
pub(crate) const COOKIE_KEYS: &[Key] = &[
    Key::CookiePersistence,
    Key::CookieDomain,
    Key::CookieDynamic,
    Key::CookieHttponly,
    Key::CookieIndirect,
    Key::CookieMaxidle,
    Key::CookieMaxlife,
    Key::CookieNocache,
    Key::CookiePostonly,
    Key::CookiePreserve,
    Key::CookieSecure,
    Key::CookieType,
];

/// Build a complete persistence [Cookie] from the `cookie-*` annotations.
///
/// Every key is resolved independently and applied whether or not it changed
/// since the last cycle; the result always replaces the previous cookie. Keys
/// that aren't set at any scope, or whose annotation was removed, leave their
/// field at its zero value. So do values that fail to parse: those are logged
/// and otherwise ignored.
pub fn resolve_cookie(scopes: &Scopes<'_>) -> Cookie {
    let mut cookie = Cookie::default();

    for &key in COOKIE_KEYS {
        let Some(annotation) = scopes.resolve(key) else {
            continue;
        };
        if annotation.status.is_removed() {
            continue;
        }
        let value = annotation.value.as_str();

        match key {
            Key::CookiePersistence => cookie.name = value.to_string(),
            Key::CookieDomain => {
                cookie.domains = value.split_whitespace().map(str::to_string).collect();
            }
            Key::CookieType => cookie.cookie_type = value.to_string(),
            Key::CookieMaxidle => cookie.maxidle = seconds_or_zero(key, value),
            Key::CookieMaxlife => cookie.maxlife = seconds_or_zero(key, value),
            Key::CookieDynamic => cookie.dynamic = flag_or_false(key, value),
            Key::CookieHttponly => cookie.httponly = flag_or_false(key, value),
            Key::CookieIndirect => cookie.indirect = flag_or_false(key, value),
            Key::CookieNocache => cookie.nocache = flag_or_false(key, value),
            Key::CookiePostonly => cookie.postonly = flag_or_false(key, value),
            Key::CookiePreserve => cookie.preserve = flag_or_false(key, value),
            Key::CookieSecure => cookie.secure = flag_or_false(key, value),
            _ => (),
        }
    }

    cookie
}

fn flag_or_false(key: Key, value: &str) -> bool {
    parse_bool(value).unwrap_or_else(|error| {
        log_zero_value(key, value, error);
        false
    })
}

fn seconds_or_zero(key: Key, value: &str) -> u64 {
    value.parse().unwrap_or_else(|e| {
        let error = Error::parse(format!("invalid number of seconds '{value}': {e}"));
        log_zero_value(key, value, error);
        0
    })
}

fn log_zero_value(key: Key, value: &str, error: Error) {
    let error = error.with_field(key.as_str());
    tracing::error!(%key, value, %error, "invalid cookie annotation, using zero value");
}
