//! Core types for region routing

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dynamic term carried as operation arguments, results and fault payloads
pub type Value = serde_json::Value;

/// Label used for the sentinel target that resolves to the primary region
pub const PRIMARY: &str = "primary";

/// Identity of one cluster participant.
///
/// A member is its node name (the address other members dial) plus an
/// instance id assigned when the process starts, so a restarted node on the
/// same address is a different member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId {
    name: String,
    instance: Uuid,
}

impl MemberId {
    /// Create a member id for a freshly started instance of `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: Uuid::new_v4(),
        }
    }

    /// Create a member id from known parts
    pub fn from_parts(name: impl Into<String>, instance: Uuid) -> Self {
        Self {
            name: name.into(),
            instance,
        }
    }

    /// Node name (address) of the member
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance disambiguator
    pub fn instance(&self) -> Uuid {
        self.instance
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instance = self.instance.simple().to_string();
        write!(f, "{}#{}", self.name, &instance[..8])
    }
}

/// Region label assigned to a member
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Create a region from its label
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Region label
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Region {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for Region {
    fn from(label: String) -> Self {
        Self(label)
    }
}

/// Where a routed call should run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// Whichever region is configured as primary
    Primary,
    /// A specific region
    Region(Region),
}

impl Target {
    /// Target a specific region
    pub fn region(label: impl Into<Region>) -> Self {
        Target::Region(label.into())
    }
}

impl From<&str> for Target {
    fn from(label: &str) -> Self {
        if label == PRIMARY {
            Target::Primary
        } else {
            Target::Region(Region::new(label))
        }
    }
}

impl From<Region> for Target {
    fn from(region: Region) -> Self {
        Target::Region(region)
    }
}

impl FromStr for Target {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Target::from(s))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Primary => f.write_str(PRIMARY),
            Target::Region(region) => write!(f, "{}", region),
        }
    }
}

/// How a connected member presents itself to the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Regular cluster member
    #[default]
    Visible,
    /// Tooling or auxiliary connection, never tracked
    Hidden,
}
