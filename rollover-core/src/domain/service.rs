//! Service domain model
//!
//! A service is a logical group of interchangeable containers identified by a
//! label value. Names are case-normalized so `API`, `api ` and `api` are the
//! same service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A case-normalized logical service name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceName(String);

impl ServiceName {
    /// Normalizes a raw name (trimmed, lowercase)
    ///
    /// Returns `None` when nothing is left after trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The configured set of services the runner is allowed to manage
///
/// Keeps configuration order and never holds duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAllowList {
    services: Vec<ServiceName>,
}

impl ServiceAllowList {
    /// Builds an allow-list from raw names, dropping blanks and duplicates
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut services: Vec<ServiceName> = Vec::new();
        for name in names {
            if let Some(service) = ServiceName::parse(name.as_ref()) {
                if !services.contains(&service) {
                    services.push(service);
                }
            }
        }
        Self { services }
    }

    /// Parses a comma-separated list such as `"api, Worker,web"`
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    /// Returns the allow-listed service a raw label value refers to, if any
    pub fn resolve(&self, label_value: &str) -> Option<&ServiceName> {
        let candidate = ServiceName::parse(label_value)?;
        self.services.iter().find(|s| **s == candidate)
    }

    pub fn contains(&self, service: &ServiceName) -> bool {
        self.services.contains(service)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceName> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Display for ServiceAllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.services.iter().map(ServiceName::as_str).collect();
        f.write_str(&names.join(","))
    }
}
