//! Container domain model
//!
//! Containers are identified by an opaque runtime-assigned id. The runner only
//! ever sees them through listing (id + labels) and inspection (start time).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A container as reported by a runtime listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Runtime-assigned container id
    pub id: String,

    /// Container labels, one of which names the owning service
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Result of inspecting a single container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    /// Runtime-assigned container id
    pub id: String,

    /// When the container's current process was started
    pub started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_label_lookup() {
        let summary = ContainerSummary {
            id: "abc".to_string(),
            labels: HashMap::from([("svc".to_string(), "api".to_string())]),
        };
        assert_eq!(summary.label("svc"), Some("api"));
        assert_eq!(summary.label("other"), None);
    }
}
