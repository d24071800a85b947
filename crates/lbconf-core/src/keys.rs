//! Recognized annotation keys and the registry that applies them.

use std::str::FromStr;

use lbconf_api::{Error, Status};

use crate::{AnnotationValue, Reach};

macro_rules! annotation_keys {
    (@reach) => { Reach::All };
    (@reach $reach:ident) => { Reach::$reach };
    ($($(#[$attr:meta])* $variant:ident = $name:literal $(in $reach:ident)?),* $(,)*) => {
        /// An annotation key this controller understands.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Key {
            $(
            $(#[$attr])*
            $variant,
            )*
        }

        impl Key {
            /// Every recognized key.
            pub const ALL: &'static [Key] = &[$(Key::$variant,)*];

            /// The annotation name for this key.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Key::$variant => $name,)*
                }
            }

            /// The scopes this key may be set in.
            pub const fn reach(&self) -> Reach {
                match self {
                    $(Key::$variant => annotation_keys!(@reach $($reach)?),)*
                }
            }
        }

        impl FromStr for Key {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Key::$variant),)*
                    other => Err(Error::parse(format!("unknown annotation '{other}'"))),
                }
            }
        }
    };
}

annotation_keys! {
    AbortOnClose = "abort-on-close",
    Check = "check",
    CheckHttp = "check-http",
    CheckInterval = "check-interval",
    CookieDomain = "cookie-domain",
    CookieDynamic = "cookie-dynamic",
    CookieHttponly = "cookie-httponly",
    CookieIndirect = "cookie-indirect",
    CookieMaxidle = "cookie-maxidle",
    CookieMaxlife = "cookie-maxlife",
    CookieNocache = "cookie-nocache",
    /// The persistence cookie name. Enables cookie persistence when set.
    CookiePersistence = "cookie-persistence",
    CookiePostonly = "cookie-postonly",
    CookiePreserve = "cookie-preserve",
    CookieSecure = "cookie-secure",
    CookieType = "cookie-type",
    ForwardedFor = "forwarded-for",
    LoadBalance = "load-balance",
    /// Tied to the pods behind a service. Only honored on the service.
    PodMaxconn = "pod-maxconn" in ServiceOnly,
    /// Tied to the pods behind a service. Only honored on the service.
    SendProxyProtocol = "send-proxy-protocol" in ServiceOnly,
    ServerSsl = "server-ssl",
    SslPassthrough = "ssl-passthrough",
    TimeoutCheck = "timeout-check",
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of applying one annotation to one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Applied {
    /// The value was parsed, validated and set.
    Set,

    /// The annotation was removed and the field was reset.
    Cleared,

    /// The value was rejected. The object is unchanged.
    Failed(Error),
}

/// How one annotation key is applied to an object of type `T`.
///
/// `C` is any extra context the setter needs beyond the raw value.
pub(crate) struct Setting<T, C = ()> {
    pub key: Key,

    /// Whether the key applies to this object at all.
    pub guard: fn(&T) -> bool,

    /// Parse, validate and set. Must leave `T` untouched on error.
    pub apply: fn(&mut T, &str, &C) -> Result<(), Error>,

    /// Reset the field when the annotation is removed. Keys without a clear
    /// treat a removed annotation's last value like any other value.
    pub clear: Option<fn(&mut T)>,
}

impl<T, C> Setting<T, C> {
    pub(crate) fn new(key: Key, apply: fn(&mut T, &str, &C) -> Result<(), Error>) -> Self {
        Self {
            key,
            guard: |_| true,
            apply,
            clear: None,
        }
    }

    pub(crate) fn clears(mut self, clear: fn(&mut T)) -> Self {
        self.clear = Some(clear);
        self
    }

    pub(crate) fn only_if(mut self, guard: fn(&T) -> bool) -> Self {
        self.guard = guard;
        self
    }

    pub(crate) fn applies_to(&self, target: &T) -> bool {
        (self.guard)(target)
    }

    /// Apply a resolved value: removed values clear the field if this key
    /// knows how to, everything else is parsed and set.
    pub(crate) fn apply_value(&self, target: &mut T, value: &AnnotationValue, ctx: &C) -> Applied {
        if let (Status::Removed, Some(clear)) = (value.status, self.clear) {
            clear(target);
            return Applied::Cleared;
        }

        match (self.apply)(target, &value.value, ctx) {
            Ok(()) => Applied::Set,
            Err(e) => Applied::Failed(e.with_field(self.key.as_str())),
        }
    }
}
