//! Annotation scopes and scope-precedence resolution.

use std::collections::BTreeMap;

use lbconf_api::Status;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::Key;

/// One resolved annotation: the raw string and how it changed since the last
/// reconciliation cycle.
///
/// For a [Status::Removed] annotation, `value` is the last value that was
/// seen before it was removed.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationValue {
    pub value: String,

    #[serde(default)]
    pub status: Status,
}

impl AnnotationValue {
    pub fn new(value: impl Into<String>, status: Status) -> Self {
        Self {
            value: value.into(),
            status,
        }
    }

    pub fn unchanged(value: impl Into<String>) -> Self {
        Self::new(value, Status::Unchanged)
    }

    pub fn changed(value: impl Into<String>) -> Self {
        Self::new(value, Status::Changed)
    }

    pub fn removed(value: impl Into<String>) -> Self {
        Self::new(value, Status::Removed)
    }
}

/// All of the annotations set at a single scope, already diffed against the
/// previous cycle.
///
/// Serializes as a plain map from annotation name to value:
///
/// ```
/// # use lbconf_core::AnnotationSource;
/// let source: AnnotationSource = serde_json::from_str(r#"{
///     "load-balance": {"value": "leastconn", "status": "changed"},
///     "check": {"value": "true"}
/// }"#).unwrap();
///
/// assert_eq!(source.get("load-balance").unwrap().value, "leastconn");
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct AnnotationSource(BTreeMap<SmolStr, AnnotationValue>);

/// The controller's built-in defaults. Applied underneath the global scope
/// with [AnnotationSource::with_defaults].
const DEFAULTS: &[(Key, &str)] = &[
    (Key::Check, "true"),
    (Key::ForwardedFor, "true"),
    (Key::LoadBalance, "roundrobin"),
    (Key::SslPassthrough, "false"),
];

impl AnnotationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source containing only the built-in defaults, all unchanged.
    pub fn defaults() -> Self {
        DEFAULTS
            .iter()
            .map(|(key, value)| (key.as_str(), AnnotationValue::unchanged(*value)))
            .collect()
    }

    /// Fill in any built-in default this source doesn't set. Values already
    /// in the source always win.
    pub fn with_defaults(mut self) -> Self {
        for (key, value) in DEFAULTS {
            self.0
                .entry(SmolStr::new(key.as_str()))
                .or_insert_with(|| AnnotationValue::unchanged(*value));
        }
        self
    }

    pub fn insert(&mut self, key: impl Into<SmolStr>, value: AnnotationValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&AnnotationValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnnotationValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<SmolStr>> FromIterator<(K, AnnotationValue)> for AnnotationSource {
    fn from_iter<T: IntoIterator<Item = (K, AnnotationValue)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Look up `key` across an ordered list of scopes, most specific first.
///
/// Returns the value from the first scope that contains `key` at all, even if
/// that value was removed, or `None` if no scope defines it.
pub fn resolve<'a>(key: &str, scopes: &[&'a AnnotationSource]) -> Option<&'a AnnotationValue> {
    scopes.iter().find_map(|scope| scope.get(key))
}

/// Which scopes a key may be set in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reach {
    /// Service, then routing rule, then global.
    All,

    /// The service only. Used for settings tied to a service's identity that
    /// a routing rule or the global config must not override.
    ServiceOnly,
}

/// The annotation scopes that apply to one routing rule, in precedence order.
#[derive(Clone, Copy, Debug)]
pub struct Scopes<'a> {
    chain: [&'a AnnotationSource; 3],
}

impl<'a> Scopes<'a> {
    pub fn new(
        service: &'a AnnotationSource,
        ingress: &'a AnnotationSource,
        global: &'a AnnotationSource,
    ) -> Self {
        Self {
            chain: [service, ingress, global],
        }
    }

    pub fn service(&self) -> &'a AnnotationSource {
        self.chain[0]
    }

    pub fn ingress(&self) -> &'a AnnotationSource {
        self.chain[1]
    }

    pub fn global(&self) -> &'a AnnotationSource {
        self.chain[2]
    }

    /// The scopes a lookup with the given reach searches, most specific first.
    pub fn chain(&self, reach: Reach) -> &[&'a AnnotationSource] {
        match reach {
            Reach::All => &self.chain,
            Reach::ServiceOnly => &self.chain[..1],
        }
    }

    /// Resolve a key across the scopes it's allowed to be set in.
    pub fn resolve(&self, key: Key) -> Option<&'a AnnotationValue> {
        resolve(key.as_str(), self.chain(key.reach()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! source {
        ($($k:expr => $v:expr),* $(,)*) => {{
            let mut source = AnnotationSource::new();
            $(
                source.insert($k, $v);
            )*
            source
        }}
    }

    #[test]
    fn test_resolve_precedence() {
        let service = source! { "load-balance" => AnnotationValue::unchanged("leastconn") };
        let ingress = source! {
            "load-balance" => AnnotationValue::changed("source"),
            "check" => AnnotationValue::unchanged("false"),
        };
        let global = source! { "check" => AnnotationValue::unchanged("true") };

        let chain = [&service, &ingress, &global];
        assert_eq!(
            resolve("load-balance", &chain),
            Some(&AnnotationValue::unchanged("leastconn"))
        );
        assert_eq!(
            resolve("check", &chain),
            Some(&AnnotationValue::unchanged("false"))
        );
        assert_eq!(resolve("server-ssl", &chain), None);
        assert_eq!(resolve("check", &[]), None);
    }

    #[test]
    fn test_resolve_stops_at_removed() {
        let service = source! { "cookie-persistence" => AnnotationValue::removed("SRV") };
        let ingress = source! { "cookie-persistence" => AnnotationValue::unchanged("OTHER") };

        assert_eq!(
            resolve("cookie-persistence", &[&service, &ingress]),
            Some(&AnnotationValue::removed("SRV"))
        );
    }

    #[test]
    fn test_service_only_reach() {
        let service = AnnotationSource::new();
        let ingress = source! { "pod-maxconn" => AnnotationValue::changed("100") };
        let global = source! { "pod-maxconn" => AnnotationValue::changed("200") };
        let scopes = Scopes::new(&service, &ingress, &global);

        assert_eq!(scopes.resolve(Key::PodMaxconn), None);
        assert_eq!(scopes.chain(Reach::ServiceOnly).len(), 1);
        assert_eq!(
            resolve("pod-maxconn", scopes.chain(Reach::All)),
            Some(&AnnotationValue::changed("100"))
        );
    }

    #[test]
    fn test_with_defaults() {
        let global = source! { "load-balance" => AnnotationValue::changed("leastconn") }
            .with_defaults();

        assert_eq!(
            global.get("load-balance"),
            Some(&AnnotationValue::changed("leastconn"))
        );
        assert_eq!(global.get("check"), Some(&AnnotationValue::unchanged("true")));
        assert_eq!(global.len(), AnnotationSource::defaults().len());
    }

    #[test]
    fn test_source_yaml() {
        let source: AnnotationSource = serde_yml::from_str(
            r#"
cookie-persistence:
  value: SRV
  status: removed
cookie-domain:
  value: a.com b.com
"#,
        )
        .unwrap();

        assert_eq!(
            source,
            source! {
                "cookie-persistence" => AnnotationValue::removed("SRV"),
                "cookie-domain" => AnnotationValue::unchanged("a.com b.com"),
            }
        );
    }
}
