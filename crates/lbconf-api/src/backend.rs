//! Backends are the proxy-side pool for one logical service. They have a
//! routing mode, a load-balancing algorithm, health checking, and an optional
//! persistence cookie. See [Backend] to get started.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ErrorContext;
use crate::shared::parse_u64;
use crate::{parse_bool, Cookie, Duration, Error};

/// How a backend proxies traffic.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Terminate HTTP and proxy requests.
    #[default]
    Http,

    /// Proxy raw TCP streams.
    Tcp,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Http => f.write_str("http"),
            Mode::Tcp => f.write_str("tcp"),
        }
    }
}

/// A backend pool.
///
/// Fields start unset. Annotations are applied through the `update_*`
/// methods, which parse and validate a raw annotation value and only mutate
/// the backend when the value is accepted.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Backend {
    /// The name of this backend in the proxy configuration.
    pub name: String,

    pub mode: Mode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Balance>,

    /// The HTTP health check request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub httpchk: Option<Httpchk>,

    /// Extra time a health check may take once the connection is up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_timeout: Option<Duration>,

    /// Add an `X-Forwarded-For` header to proxied requests.
    #[serde(default)]
    pub forwarded_for: bool,

    /// Abort requests whose client closed the connection while queued.
    #[serde(default)]
    pub abort_on_close: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<Cookie>,
}

impl Backend {
    /// Create a new, unconfigured backend.
    pub fn new(name: impl Into<String>, mode: Mode) -> Self {
        Self {
            name: name.into(),
            mode,
            ..Default::default()
        }
    }

    pub fn update_abort_on_close(&mut self, value: &str) -> Result<(), Error> {
        self.abort_on_close = parse_bool(value)?;
        Ok(())
    }

    pub fn update_forwarded_for(&mut self, value: &str) -> Result<(), Error> {
        self.forwarded_for = parse_bool(value)?;
        Ok(())
    }

    pub fn update_balance(&mut self, value: &str) -> Result<(), Error> {
        self.balance = Some(value.parse()?);
        Ok(())
    }

    pub fn update_check_timeout(&mut self, value: &str) -> Result<(), Error> {
        self.check_timeout = Some(value.parse()?);
        Ok(())
    }

    pub fn update_httpchk(&mut self, value: &str) -> Result<(), Error> {
        self.httpchk = Some(value.parse()?);
        Ok(())
    }

    /// Replace this backend's persistence cookie.
    ///
    /// A cookie with an empty name disables persistence. Anything else is
    /// validated and replaces the current cookie wholesale.
    pub fn update_cookie(&mut self, cookie: Cookie) -> Result<(), Error> {
        if cookie.name.is_empty() {
            self.cookie = None;
            return Ok(());
        }

        cookie.validate()?;
        self.cookie = Some(cookie);
        Ok(())
    }
}

/// A load-balancing algorithm and its arguments.
///
/// Parsed from the proxy's `balance` syntax, e.g. `leastconn`, `hdr(host)`,
/// `uri len 12 depth 2` or `url_param session`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum Balance {
    RoundRobin,

    StaticRr,

    LeastConn,

    First,

    Source,

    /// Pick the least loaded of `draws` random servers.
    Random {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draws: Option<u32>,
    },

    /// Hash the request path, or the whole URI when `whole` is set.
    Uri {
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        whole: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        len: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depth: Option<u32>,
    },

    /// Hash the value of a query parameter.
    UrlParam { param: String },

    /// Hash the value of a request header.
    Hdr { name: String },

    /// Hash the value of an RDP cookie, `mstshash` by default.
    RdpCookie {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl FromStr for Balance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let head = tokens
            .next()
            .ok_or_else(|| Error::parse("missing load-balancing algorithm"))?;
        let args: Vec<&str> = tokens.collect();

        // algorithms with a single argument take it in parens
        let (algorithm, inline_arg) = match head.split_once('(') {
            Some((algorithm, rest)) => {
                let arg = rest
                    .strip_suffix(')')
                    .ok_or_else(|| Error::parse(format!("unterminated argument in '{head}'")))?;
                (algorithm, Some(arg))
            }
            None => (head, None),
        };

        let no_args = |balance: Balance| -> Result<Balance, Error> {
            if inline_arg.is_some() || !args.is_empty() {
                return Err(Error::validation(format!(
                    "'{algorithm}' does not take arguments"
                )));
            }
            Ok(balance)
        };

        match algorithm {
            "roundrobin" => no_args(Balance::RoundRobin),
            "static-rr" => no_args(Balance::StaticRr),
            "leastconn" => no_args(Balance::LeastConn),
            "first" => no_args(Balance::First),
            "source" => no_args(Balance::Source),
            "random" => {
                if !args.is_empty() {
                    return Err(Error::validation("random only takes a draw count"));
                }
                let draws = inline_arg.map(parse_draws).transpose()?;
                Ok(Balance::Random { draws })
            }
            "uri" => {
                if inline_arg.is_some() {
                    return Err(Error::validation("uri arguments are not parenthesized"));
                }
                parse_uri_args(&args)
            }
            "url_param" => match (inline_arg, args.as_slice()) {
                (None, [param]) => Ok(Balance::UrlParam {
                    param: param.to_string(),
                }),
                _ => Err(Error::validation("url_param requires exactly one parameter name")),
            },
            "hdr" => match (inline_arg, args.is_empty()) {
                (Some(name), true) if !name.is_empty() => Ok(Balance::Hdr {
                    name: name.to_string(),
                }),
                _ => Err(Error::validation("hdr requires a header name, e.g. hdr(host)")),
            },
            "rdp-cookie" => {
                if !args.is_empty() || inline_arg == Some("") {
                    return Err(Error::validation("rdp-cookie takes at most a cookie name"));
                }
                Ok(Balance::RdpCookie {
                    name: inline_arg.map(str::to_string),
                })
            }
            other => Err(Error::parse(format!(
                "unknown load-balancing algorithm '{other}'"
            ))),
        }
    }
}

fn parse_draws(s: &str) -> Result<u32, Error> {
    match s.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::validation(format!(
            "random draws must be a positive integer, got '{s}'"
        ))),
    }
}

fn parse_uri_args(args: &[&str]) -> Result<Balance, Error> {
    let (mut whole, mut len, mut depth) = (false, None, None);

    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match *arg {
            "whole" => whole = true,
            "len" | "depth" => {
                let value = args
                    .next()
                    .ok_or_else(|| Error::validation(format!("uri {arg} requires a value")))?;
                let value: u32 = parse_u64(value)
                    .and_then(|v| {
                        v.try_into()
                            .map_err(|_| Error::validation(format!("uri {arg} is out of range")))
                    })
                    .with_field(if *arg == "len" { "len" } else { "depth" })?;
                if *arg == "len" {
                    len = Some(value);
                } else {
                    depth = Some(value);
                }
            }
            other => {
                return Err(Error::validation(format!("unknown uri argument '{other}'")));
            }
        }
    }

    Ok(Balance::Uri { whole, len, depth })
}

impl std::fmt::Display for Balance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Balance::RoundRobin => f.write_str("roundrobin"),
            Balance::StaticRr => f.write_str("static-rr"),
            Balance::LeastConn => f.write_str("leastconn"),
            Balance::First => f.write_str("first"),
            Balance::Source => f.write_str("source"),
            Balance::Random { draws: None } => f.write_str("random"),
            Balance::Random { draws: Some(n) } => write!(f, "random({n})"),
            Balance::Uri { whole, len, depth } => {
                f.write_str("uri")?;
                if *whole {
                    f.write_str(" whole")?;
                }
                if let Some(len) = len {
                    write!(f, " len {len}")?;
                }
                if let Some(depth) = depth {
                    write!(f, " depth {depth}")?;
                }
                Ok(())
            }
            Balance::UrlParam { param } => write!(f, "url_param {param}"),
            Balance::Hdr { name } => write!(f, "hdr({name})"),
            Balance::RdpCookie { name: None } => f.write_str("rdp-cookie"),
            Balance::RdpCookie { name: Some(name) } => write!(f, "rdp-cookie({name})"),
        }
    }
}

/// An HTTP health check request.
///
/// Parsed from `<uri>`, `<method> <uri>` or `<method> <uri> <version>`, where
/// everything past the URI is taken as the version string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Httpchk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl FromStr for Httpchk {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let params: Vec<&str> = s.split_whitespace().collect();

        let httpchk = match params.as_slice() {
            [] => return Err(Error::parse("expected '[<method>] <uri> [<version>]'")),
            [uri] => Httpchk {
                method: None,
                uri: uri.to_string(),
                version: None,
            },
            [method, uri] => Httpchk {
                method: Some(method.to_string()),
                uri: uri.to_string(),
                version: None,
            },
            [method, uri, version @ ..] => Httpchk {
                method: Some(method.to_string()),
                uri: uri.to_string(),
                version: Some(version.join(" ")),
            },
        };

        httpchk.validate()?;
        Ok(httpchk)
    }
}

impl Httpchk {
    fn validate(&self) -> Result<(), Error> {
        if let Some(method) = &self.method {
            let known = http::Method::from_bytes(method.as_bytes())
                .map(|m| is_standard_method(&m))
                .unwrap_or(false);
            if !known {
                return Err(Error::validation(format!("unsupported method '{method}'")))
                    .with_field("method");
            }
        }

        if !self.uri.starts_with('/') {
            return Err(Error::validation(format!(
                "uri '{}' must be an absolute path",
                self.uri
            )))
            .with_field("uri");
        }

        if let Some(version) = &self.version {
            if !version.starts_with("HTTP/") {
                return Err(Error::validation(format!("invalid version '{version}'")))
                    .with_field("version");
            }
        }

        Ok(())
    }
}

fn is_standard_method(method: &http::Method) -> bool {
    [
        http::Method::GET,
        http::Method::HEAD,
        http::Method::POST,
        http::Method::PUT,
        http::Method::DELETE,
        http::Method::OPTIONS,
        http::Method::TRACE,
        http::Method::CONNECT,
        http::Method::PATCH,
    ]
    .contains(method)
}

impl std::fmt::Display for Httpchk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(method) = &self.method {
            write!(f, "{method} ")?;
        }
        f.write_str(&self.uri)?;
        if let Some(version) = &self.version {
            write!(f, " {version}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::fmt::Debug;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_balance() {
        let cases = [
            ("roundrobin", Balance::RoundRobin),
            ("static-rr", Balance::StaticRr),
            ("leastconn", Balance::LeastConn),
            ("first", Balance::First),
            ("source", Balance::Source),
            ("random", Balance::Random { draws: None }),
            ("random(2)", Balance::Random { draws: Some(2) }),
            (
                "uri",
                Balance::Uri {
                    whole: false,
                    len: None,
                    depth: None,
                },
            ),
            (
                "uri whole len 12 depth 3",
                Balance::Uri {
                    whole: true,
                    len: Some(12),
                    depth: Some(3),
                },
            ),
            (
                "url_param session",
                Balance::UrlParam {
                    param: "session".to_string(),
                },
            ),
            (
                "hdr(host)",
                Balance::Hdr {
                    name: "host".to_string(),
                },
            ),
            ("rdp-cookie", Balance::RdpCookie { name: None }),
            (
                "rdp-cookie(user)",
                Balance::RdpCookie {
                    name: Some("user".to_string()),
                },
            ),
        ];

        for (s, expected) in cases {
            let balance: Balance = s.parse().unwrap();
            assert_eq!(balance, expected, "parsing {s:?}");
            assert_eq!(balance.to_string(), s, "formatting {s:?}");
        }
    }

    #[test]
    fn test_parse_balance_errors() {
        for s in ["", "bogus", "round-robin", "hdr(host"] {
            assert!(s.parse::<Balance>().unwrap_err().is_parse(), "{s:?}");
        }

        for s in [
            "leastconn extra",
            "roundrobin(2)",
            "random(0)",
            "url_param",
            "url_param a b",
            "hdr",
            "hdr()",
            "uri len",
            "uri len abc",
            "uri bogus",
        ] {
            assert!(s.parse::<Balance>().is_err(), "{s:?} should not parse");
        }
    }

    #[test]
    fn test_parse_httpchk() {
        assert_eq!(
            "/healthz".parse::<Httpchk>().unwrap(),
            Httpchk {
                method: None,
                uri: "/healthz".to_string(),
                version: None,
            }
        );
        assert_eq!(
            "HEAD /healthz".parse::<Httpchk>().unwrap(),
            Httpchk {
                method: Some("HEAD".to_string()),
                uri: "/healthz".to_string(),
                version: None,
            }
        );

        let with_host: Httpchk = r"GET / HTTP/1.1\r\nHost:\ example.com".parse().unwrap();
        assert_eq!(
            with_host.version.as_deref(),
            Some(r"HTTP/1.1\r\nHost:\ example.com")
        );
    }

    #[test]
    fn test_parse_httpchk_errors() {
        assert!("".parse::<Httpchk>().unwrap_err().is_parse());
        assert!("   ".parse::<Httpchk>().unwrap_err().is_parse());

        let err = "FETCH /healthz".parse::<Httpchk>().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.path(), "method");

        let err = "GET healthz".parse::<Httpchk>().unwrap_err();
        assert_eq!(err.path(), "uri");

        let err = "GET /healthz SPDY/3".parse::<Httpchk>().unwrap_err();
        assert_eq!(err.path(), "version");
    }

    #[test]
    fn test_update_leaves_backend_untouched_on_error() {
        let mut backend = Backend::new("default-svc-80", Mode::Http);
        backend.update_balance("leastconn").unwrap();
        backend.update_abort_on_close("true").unwrap();

        let before = backend.clone();
        assert!(backend.update_balance("bogus").is_err());
        assert!(backend.update_abort_on_close("maybe").is_err());
        assert!(backend.update_check_timeout("soon").is_err());
        assert!(backend.update_httpchk("").is_err());
        assert_eq!(backend, before);
    }

    #[test]
    fn test_update_cookie_with_empty_name_disables() {
        let mut backend = Backend::new("default-svc-80", Mode::Http);
        backend
            .update_cookie(Cookie {
                name: "SRV".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert!(backend.cookie.is_some());

        backend.update_cookie(Cookie::default()).unwrap();
        assert_eq!(backend.cookie, None);
    }

    #[test]
    fn test_backend_json() {
        assert_round_trip::<Backend>(json!({
            "name": "default-svc-80",
            "mode": "tcp",
            "balance": {"algorithm": "uri", "whole": true, "depth": 2},
            "httpchk": {"method": "GET", "uri": "/healthz"},
            "check_timeout": 5.0,
            "forwarded_for": true,
            "abort_on_close": false,
        }));
    }

    #[track_caller]
    fn assert_round_trip<T: Debug + Serialize + for<'a> Deserialize<'a>>(value: serde_json::Value) {
        let from_json: T = serde_json::from_value(value.clone()).expect("failed to deserialize");
        let round_tripped = serde_json::to_value(&from_json).expect("failed to serialize");

        assert_eq!(value, round_tripped, "serialized value should round-trip")
    }
}
