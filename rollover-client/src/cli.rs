//! Local CLI runtime client
//!
//! Drives the runtime through its command-line tool when no Engine host/port is
//! configured. The CLI then uses whatever default local connection it has
//! (usually the unix socket).
//!
//! Handles:
//! - Listing running containers with their labels
//! - Inspecting a container's start time
//! - Stopping and starting a container by id

use async_trait::async_trait;
use rollover_core::domain::container::{ContainerDetails, ContainerSummary};
use rollover_core::dto::container::{CliContainerLine, EngineContainerInspect};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use crate::ContainerRuntime;
use crate::error::{ClientError, Result};

/// Runtime client backed by a `docker`-compatible binary
#[derive(Debug, Clone)]
pub struct CliClient {
    program: String,
}

impl CliClient {
    /// Creates a client for the given binary (e.g. `docker`)
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runs a command and returns its output only if it exited 0
    ///
    /// `target` names the container the command acts on, so a missing
    /// container surfaces as [`ClientError::NotFound`].
    async fn run(&self, args: &[&str], target: Option<&str>) -> Result<Output> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!("Running {}", command);

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| ClientError::Spawn {
                command: command.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if let Some(id) = target {
            if stderr.contains("No such container") || stderr.contains("no such container") {
                return Err(ClientError::NotFound(id.to_string()));
            }
        }

        Err(ClientError::CommandFailed {
            command,
            exit_code: output.status.code().unwrap_or(-1),
            stderr,
        })
    }
}

/// Parses `ps --format '{{json .}}'` output, one JSON object per line
fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerSummary>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<CliContainerLine>(line)
                .map(Into::into)
                .map_err(|e| ClientError::ParseError(format!("Invalid ps line '{}': {}", line, e)))
        })
        .collect()
}

/// Parses `inspect` output, a JSON array with one entry per container
fn parse_inspect_output(id: &str, stdout: &str) -> Result<ContainerDetails> {
    let entries: Vec<EngineContainerInspect> = serde_json::from_str(stdout)
        .map_err(|e| ClientError::ParseError(format!("Invalid inspect output: {}", e)))?;

    entries
        .into_iter()
        .next()
        .map(Into::into)
        .ok_or_else(|| ClientError::NotFound(id.to_string()))
}

#[async_trait]
impl ContainerRuntime for CliClient {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let output = self
            .run(&["ps", "--no-trunc", "--format", "{{json .}}"], None)
            .await?;
        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        let output = self.run(&["inspect", id], Some(id)).await?;
        parse_inspect_output(id, &String::from_utf8_lossy(&output.stdout))
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.run(&["stop", id], Some(id)).await?;
        Ok(())
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.run(&["start", id], Some(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_output() {
        let stdout = concat!(
            r#"{"ID":"aaa","Labels":"com.docker.compose.service=api","Names":"api_1"}"#,
            "\n",
            "\n",
            r#"{"ID":"bbb","Labels":"","Names":"misc"}"#,
            "\n"
        );

        let containers = parse_ps_output(stdout).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].label("com.docker.compose.service"), Some("api"));
        assert!(containers[1].labels.is_empty());
    }

    #[test]
    fn test_parse_ps_output_rejects_garbage() {
        let err = parse_ps_output("not json").unwrap_err();
        assert!(matches!(err, ClientError::ParseError(_)));
    }

    #[test]
    fn test_parse_inspect_output() {
        let stdout = r#"[{"Id":"aaa","State":{"Running":true,"StartedAt":"2024-05-01T08:00:00Z"}}]"#;
        let details = parse_inspect_output("aaa", stdout).unwrap();
        assert_eq!(details.id, "aaa");
        assert_eq!(details.started_at.to_rfc3339(), "2024-05-01T08:00:00+00:00");
    }

    #[test]
    fn test_parse_inspect_empty_array_is_not_found() {
        let err = parse_inspect_output("gone", "[]").unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let client = CliClient::new("rollover-definitely-not-a-runtime");
        let err = client.list_containers().await.unwrap_err();
        assert!(matches!(err, ClientError::Spawn { .. }));
    }
}
