//! Persistence cookies.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ErrorContext;
use crate::shared::validate_hostname;
use crate::Error;

/// A persistence cookie that pins clients to one server of a backend.
///
/// A cookie is always built in full and replaces the previous one. Fields
/// that weren't configured keep their zero value.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookie {
    /// The name of the cookie. An empty name means persistence is disabled.
    pub name: String,

    /// Domains the cookie is valid for, in the order they were configured.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,

    #[serde(default)]
    pub dynamic: bool,

    #[serde(default)]
    pub httponly: bool,

    #[serde(default)]
    pub indirect: bool,

    #[serde(default)]
    pub nocache: bool,

    #[serde(default)]
    pub postonly: bool,

    #[serde(default)]
    pub preserve: bool,

    #[serde(default)]
    pub secure: bool,

    /// Maximum idle time, in seconds. Zero means unlimited.
    #[serde(default)]
    pub maxidle: u64,

    /// Maximum lifetime, in seconds. Zero means unlimited.
    #[serde(default)]
    pub maxlife: u64,

    /// How the cookie is set, as configured. An empty type leaves the choice
    /// to the proxy. See [CookieType].
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub cookie_type: String,
}

impl Cookie {
    /// Check that this cookie can be handed to the proxy.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::validation("cookie name must not be empty")).with_field("name");
        }

        for (i, domain) in self.domains.iter().enumerate() {
            validate_hostname(domain).with_field_index("domains", i)?;
        }

        if !self.cookie_type.is_empty() {
            CookieType::from_str(&self.cookie_type)
                .map_err(|e| Error::validation(e.to_string()))
                .with_field("type")?;
        }

        Ok(())
    }

    /// The parsed [CookieType], if one was configured.
    pub fn kind(&self) -> Option<CookieType> {
        self.cookie_type.parse().ok()
    }
}

/// How the proxy sets a persistence cookie.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CookieType {
    /// Insert a new cookie into responses.
    Insert,

    /// Rewrite a cookie the server set.
    Rewrite,

    /// Prefix the server's cookie value with the server identifier.
    Prefix,
}

impl FromStr for CookieType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(CookieType::Insert),
            "rewrite" => Ok(CookieType::Rewrite),
            "prefix" => Ok(CookieType::Prefix),
            other => Err(Error::parse(format!(
                "unknown cookie type '{other}', expected insert, rewrite or prefix"
            ))),
        }
    }
}

impl std::fmt::Display for CookieType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CookieType::Insert => f.write_str("insert"),
            CookieType::Rewrite => f.write_str("rewrite"),
            CookieType::Prefix => f.write_str("prefix"),
        }
    }
}
