//! Container DTOs
//!
//! Wire shapes for container listing and inspection, covering both the Engine
//! HTTP API and the `docker` CLI's `--format '{{json .}}'` output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::container::{ContainerDetails, ContainerSummary};

/// One element of `GET /containers/json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineContainerSummary {
    pub id: String,

    /// The Engine API sends `null` for containers without labels
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

impl From<EngineContainerSummary> for ContainerSummary {
    fn from(dto: EngineContainerSummary) -> Self {
        ContainerSummary {
            id: dto.id,
            labels: dto.labels.unwrap_or_default(),
        }
    }
}

/// Body of `GET /containers/{id}/json`, also one element of `docker inspect`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineContainerInspect {
    pub id: String,
    pub state: EngineContainerState,
}

/// The subset of container state the runner needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineContainerState {
    /// Never-started containers report `0001-01-01T00:00:00Z`
    pub started_at: DateTime<Utc>,
}

impl From<EngineContainerInspect> for ContainerDetails {
    fn from(dto: EngineContainerInspect) -> Self {
        ContainerDetails {
            id: dto.id,
            started_at: dto.state.started_at,
        }
    }
}

/// One line of `docker ps --no-trunc --format '{{json .}}'`
///
/// The CLI flattens labels into a single `k=v,k=v` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliContainerLine {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Labels", default)]
    pub labels: String,
}

impl CliContainerLine {
    /// Splits the flattened label string back into pairs
    ///
    /// A segment without `=` continues the previous value, since the CLI does
    /// not escape commas inside values. A leading segment without `=` is kept
    /// as a key with an empty value. A value that itself contains `,k=v` cannot
    /// be told apart from a separate label.
    pub fn parse_labels(&self) -> HashMap<String, String> {
        let mut pairs: Vec<(String, String)> = Vec::new();

        for segment in self.labels.split(',') {
            if segment.trim().is_empty() {
                continue;
            }

            if let Some((key, value)) = segment.split_once('=') {
                pairs.push((key.trim().to_string(), value.to_string()));
            } else if let Some((_, value)) = pairs.last_mut() {
                value.push(',');
                value.push_str(segment);
            } else {
                pairs.push((segment.trim().to_string(), String::new()));
            }
        }

        pairs.into_iter().collect()
    }
}

impl From<CliContainerLine> for ContainerSummary {
    fn from(line: CliContainerLine) -> Self {
        let labels = line.parse_labels();
        ContainerSummary {
            id: line.id,
            labels,
        }
    }
}
