//! QoS tiers and their strict priority ordering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality-of-service tier carried on every ATP frame.
///
/// Tiers are strictly ordered: gold outranks silver outranks bronze.
/// Scheduling, span sampling, and preemption all key off this ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QosTier {
    /// Highest priority. Never preempted, fully sampled.
    Gold,
    /// Mid priority.
    Silver,
    /// Lowest priority. First preemption victim.
    #[default]
    Bronze,
}

impl QosTier {
    /// All tiers in descending priority order.
    pub const ALL: [QosTier; 3] = [QosTier::Gold, QosTier::Silver, QosTier::Bronze];

    /// Scheduling rank: 0 is highest priority.
    #[must_use]
    pub fn rank(self) -> usize {
        match self {
            Self::Gold => 0,
            Self::Silver => 1,
            Self::Bronze => 2,
        }
    }

    /// True if `self` strictly outranks `other`.
    #[must_use]
    pub fn outranks(self, other: QosTier) -> bool {
        self.rank() < other.rank()
    }

    /// The stable wire name of the tier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Silver => "silver",
            Self::Bronze => "bronze",
        }
    }
}

impl fmt::Display for QosTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QosTier {
    type Err = UnknownQosTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gold" => Ok(Self::Gold),
            "silver" => Ok(Self::Silver),
            "bronze" => Ok(Self::Bronze),
            other => Err(UnknownQosTier(other.to_string())),
        }
    }
}

/// A QoS tier string that is not one of `gold`, `silver`, `bronze`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown qos tier: {0}")]
pub struct UnknownQosTier(pub String);
