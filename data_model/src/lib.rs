use std::fmt::{Display, Formatter};

use serde_derive::{Deserialize, Serialize};

/// Outcome of one reachability probe. Derived fresh on every probe and never
/// cached across monitor ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityStatus {
    Reachable,
    Unreachable,
}

impl Display for ConnectivityStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityStatus::Reachable => write!(f, "reachable"),
            ConnectivityStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// The network the machine is currently associated with, as far as the
/// platform can tell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Association {
    Ssid(String),
    /// The platform could not determine the association.
    Unknown,
}

impl Association {
    pub fn matches(&self, target: &str) -> bool {
        matches!(self, Association::Ssid(name) if name == target)
    }
}

impl Display for Association {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Association::Ssid(name) => write!(f, "{name}"),
            Association::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classification of the portal page at the start of a re-authentication
/// attempt. Transient; recomputed per attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortalState {
    LoggedIn,
    LoggedOut,
    /// The page shows neither a login form nor a logout control. A plain
    /// logged-out landing page and a portal UI change look the same here,
    /// so neither is assumed.
    Indeterminate,
}

impl Display for PortalState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PortalState::LoggedIn => write!(f, "logged-in"),
            PortalState::LoggedOut => write!(f, "logged-out"),
            PortalState::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// One way of finding an element on the portal page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Structural XPath from the document root.
    Path(String),
    /// CSS selector, typically an attribute match.
    Attr(String),
    /// Match on visible text content.
    Text(String),
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Path(xpath) => write!(f, "path({xpath})"),
            Strategy::Attr(css) => write!(f, "attr({css})"),
            Strategy::Text(text) => write!(f, "text({text})"),
        }
    }
}

/// Ordered list of strategies for one logical element. The order is the
/// fallback order; static configuration, never mutated at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSpec {
    pub target: String,
    pub strategies: Vec<Strategy>,
}

impl LocatorSpec {
    pub fn new(target: impl Into<String>, strategies: Vec<Strategy>) -> Self {
        LocatorSpec {
            target: target.into(),
            strategies,
        }
    }
}

impl Display for LocatorSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.target)
    }
}
