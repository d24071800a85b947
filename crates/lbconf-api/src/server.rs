//! Servers are the individual members of a [Backend][crate::Backend] pool.

use serde::{Deserialize, Serialize};

use crate::error::ErrorContext;
use crate::shared::parse_u64;
use crate::{parse_bool, Duration, Error};

/// One member of a backend pool.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Server {
    /// The name of this server within its backend.
    pub name: String,

    /// Whether health checks are enabled.
    #[serde(default)]
    pub check: bool,

    /// The port to send health checks to, if not the traffic port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_port: Option<u16>,

    /// Time between health checks. Unset means the proxy default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter: Option<Duration>,

    /// Maximum concurrent connections. Unset means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxconn: Option<u64>,

    /// The value echoed in the backend's persistence cookie for this server.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cookie: String,

    /// Use TLS for connections to this server.
    #[serde(default)]
    pub ssl: bool,

    /// Send a PROXY protocol header on new connections.
    #[serde(default)]
    pub send_proxy: bool,
}

impl Server {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Enable or disable health checks, optionally with a dedicated check
    /// port: `true`, `false`, or `true <port>`.
    pub fn update_check(&mut self, value: &str) -> Result<(), Error> {
        let mut params = value.split_whitespace();
        let enabled = parse_bool(params.next().unwrap_or_default())?;

        let port = match (params.next(), params.next()) {
            (None, _) => None,
            (Some(port), None) => Some(parse_port(port).with_field("port")?),
            (Some(_), Some(_)) => {
                return Err(Error::parse("expected '<true|false> [<port>]'"));
            }
        };

        if !enabled && port.is_some() {
            return Err(Error::validation("a check port requires checks to be enabled"))
                .with_field("port");
        }

        self.check = enabled;
        self.check_port = port;
        Ok(())
    }

    pub fn update_inter(&mut self, value: &str) -> Result<(), Error> {
        let inter: Duration = value.parse()?;
        if inter.is_zero() {
            return Err(Error::validation("check interval must be greater than zero"));
        }
        self.inter = Some(inter);
        Ok(())
    }

    pub fn update_maxconn(&mut self, value: &str) -> Result<(), Error> {
        match parse_u64(value)? {
            0 => Err(Error::validation("maxconn must be a positive integer")),
            n => {
                self.maxconn = Some(n);
                Ok(())
            }
        }
    }

    pub fn update_ssl(&mut self, value: &str) -> Result<(), Error> {
        self.ssl = parse_bool(value)?;
        Ok(())
    }

    pub fn update_send_proxy(&mut self, value: &str) -> Result<(), Error> {
        self.send_proxy = parse_bool(value)?;
        Ok(())
    }
}

fn parse_port(s: &str) -> Result<u16, Error> {
    match s.parse::<u16>() {
        Ok(0) => Err(Error::validation("port must not be zero")),
        Ok(port) => Ok(port),
        Err(e) => Err(Error::parse(format!("invalid port '{s}': {e}"))),
    }
}
