//! Site context sent with the sign-in request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Shape of the `site` object inside the sign-in credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteContext {
    /// `"site": {"contentUrl": "<name>"}`
    Named(String),
    /// No `site` object at all.
    Omitted,
    /// `"site": {"contentUrl": ""}`, the server's default site.
    Default,
}

impl SiteContext {
    /// Context for a configured site content URL; empty means the default site.
    pub fn for_site(site: &str) -> Self {
        if site.is_empty() {
            Self::Default
        } else {
            Self::Named(site.to_string())
        }
    }

    /// Candidates tried, in order, when the mode is [`SiteContextMode::Auto`].
    pub fn probe_order(site: &str) -> Vec<Self> {
        let mut order = Vec::with_capacity(3);
        if !site.is_empty() {
            order.push(Self::Named(site.to_string()));
        }
        order.push(Self::Omitted);
        order.push(Self::Default);
        order
    }

    /// The `contentUrl` to send, or `None` to omit the site object.
    pub fn content_url(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Omitted => None,
            Self::Default => Some(""),
        }
    }
}

impl fmt::Display for SiteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "site '{name}'"),
            Self::Omitted => f.write_str("no site"),
            Self::Default => f.write_str("default site"),
        }
    }
}

/// How the client picks a [`SiteContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteContextMode {
    /// Send the configured site (empty = default site).
    #[default]
    Explicit,
    /// Never send a site object.
    Omitted,
    /// Probe once, then keep whichever shape signed in.
    Auto,
}

impl FromStr for SiteContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(Self::Explicit),
            "omitted" | "omit" | "none" => Ok(Self::Omitted),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown site context mode: {other}")),
        }
    }
}
