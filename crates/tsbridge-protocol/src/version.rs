//! Resolved TypeScript version and its feature gates

use std::fmt;
use std::str::FromStr;

use semver::Version;

/// The version of the resolved tsserver, used to gate feature usage.
///
/// Ordered like semver (pre-release versions sort before their release),
/// so `ApiVersion::from_str("4.9.0-beta") < ApiVersion::new(4, 9, 0)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion(Version);

impl ApiVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// The version assumed when no `package.json` could be read. Old enough
    /// that every gate below stays closed.
    pub fn fallback() -> Self {
        Self::new(3, 9, 0)
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    fn at_least(&self, major: u64, minor: u64) -> bool {
        (self.0.major, self.0.minor) >= (major, minor)
    }

    /// Discrete JSON messages over a node IPC channel instead of stdio.
    pub fn supports_node_ipc(&self) -> bool {
        self.at_least(4, 9)
    }

    pub fn supports_inlay_hints(&self) -> bool {
        self.at_least(4, 4)
    }

    pub fn supports_source_definition(&self) -> bool {
        self.at_least(4, 7)
    }

    /// A second, syntax-only server process can be run alongside.
    pub fn supports_syntax_server(&self) -> bool {
        self.at_least(4, 0)
    }

    pub fn supports_linked_editing(&self) -> bool {
        self.at_least(4, 5)
    }

    pub fn supports_inferred_project_per_project_root(&self) -> bool {
        self.at_least(2, 5)
    }
}

impl FromStr for ApiVersion {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s.trim()).map(Self)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
