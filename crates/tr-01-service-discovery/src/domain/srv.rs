//! SRV records and target selection.

use serde::{Deserialize, Serialize};
use shared_types::ServiceLocation;
use std::cmp::Ordering;

/// One SRV answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SrvRecord {
    /// Target host, without the trailing root dot.
    pub target: String,
    /// Target port.
    pub port: u16,
    /// Lower values are preferred.
    pub priority: u16,
    /// Higher values are preferred among equal priorities.
    pub weight: u16,
}

impl SrvRecord {
    /// Create a record.
    pub fn new(target: impl Into<String>, port: u16, priority: u16, weight: u16) -> Self {
        Self {
            target: target.into(),
            port,
            priority,
            weight,
        }
    }

    /// The host and port this record points to.
    #[must_use]
    pub fn location(&self) -> ServiceLocation {
        ServiceLocation::new(self.target.trim_end_matches('.'), self.port)
    }

    fn preference(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.weight.cmp(&self.weight))
            .then_with(|| self.target.cmp(&other.target))
            .then_with(|| self.port.cmp(&other.port))
    }
}

/// Pick one record deterministically.
///
/// Lowest priority wins; ties go to the highest weight, then the
/// lexicographically smallest target, then the smallest port. The result
/// does not depend on the order of `records`.
#[must_use]
pub fn select_record(records: &[SrvRecord]) -> Option<&SrvRecord> {
    records
        .iter()
        .filter(|record| !record.target.is_empty() && record.target != ".")
        .min_by(|a, b| a.preference(b))
}

/// Where a service lives: a fixed location or an SRV name to look up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceTarget {
    /// Use this location as is.
    Static(ServiceLocation),
    /// Resolve this SRV name.
    Srv(String),
}

impl ServiceTarget {
    /// SRV name when one is set, otherwise the static location.
    pub fn from_parts(srv_name: Option<String>, location: ServiceLocation) -> Self {
        match srv_name.filter(|name| !name.trim().is_empty()) {
            Some(name) => Self::Srv(name),
            None => Self::Static(location),
        }
    }
}
