//! `docker compose` backed [`ContainerRuntime`]
//!
//! Every operation shells out to the docker CLI with
//! `tokio::process::Command`; nothing talks to the daemon socket
//! directly.

use crate::compose::{ContainerHandle, ContainerRuntime};
use crate::config::CompositionSettings;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Drives a composition through the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    program: String,
    compose_files: Vec<PathBuf>,
    project: Option<String>,
}

impl DockerCompose {
    #[must_use]
    pub fn new(settings: &CompositionSettings) -> Self {
        Self {
            program: "docker".to_string(),
            compose_files: settings.compose_files.clone(),
            project: settings.project.clone(),
        }
    }

    /// Use a different docker-compatible binary (e.g. `podman`).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn compose(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("compose");
        for file in &self.compose_files {
            cmd.arg("--file").arg(file);
        }
        if let Some(project) = &self.project {
            cmd.arg("--project-name").arg(project);
        }
        cmd
    }

    fn docker(&self) -> Command {
        Command::new(&self.program)
    }
}

/// Run `cmd` to completion and return (stdout, stderr), or a composition
/// error naming `what` and carrying stderr.
async fn run(mut cmd: Command, what: &str) -> Result<(String, String)> {
    debug!("Running {}", what);
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Composition(format!("`{what}` could not be started: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(Error::Composition(format!(
            "`{what}` exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok((stdout, stderr))
}

impl ContainerRuntime for DockerCompose {
    async fn up(&self) -> Result<()> {
        let mut cmd = self.compose();
        cmd.args(["up", "--detach"]);
        run(cmd, "docker compose up").await.map(drop)
    }

    async fn down(&self) -> Result<()> {
        let mut cmd = self.compose();
        cmd.arg("down");
        run(cmd, "docker compose down").await.map(drop)
    }

    async fn list_containers(
        &self,
        services: &[&str],
        include_stopped: bool,
    ) -> Result<Vec<ContainerHandle>> {
        let mut cmd = self.compose();
        cmd.args(["ps", "--format", "json"]);
        if include_stopped {
            cmd.arg("--all");
        }
        cmd.args(services);
        let (stdout, _) = run(cmd, "docker compose ps").await?;
        parse_ps(&stdout)
    }

    async fn logs(&self, id: &str) -> Result<String> {
        let mut cmd = self.docker();
        cmd.args(["logs", id]);
        let (stdout, stderr) = run(cmd, "docker logs").await?;
        Ok(stdout + &stderr)
    }

    async fn labels(&self, id: &str) -> Result<HashMap<String, String>> {
        let mut cmd = self.docker();
        cmd.args(["inspect", "--format", "{{json .Config.Labels}}", id]);
        let (stdout, _) = run(cmd, "docker inspect").await?;
        parse_labels(&stdout)
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        let mut cmd = self.docker();
        cmd.args(["wait", id]);
        let (stdout, _) = run(cmd, "docker wait").await?;
        stdout.trim().parse().map_err(|e| {
            Error::Composition(format!("docker wait printed {:?}: {e}", stdout.trim()))
        })
    }
}

/// One row of `docker compose ps --format json`.
#[derive(Debug, Deserialize)]
struct PsRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "ExitCode", default)]
    exit_code: Option<i64>,
}

impl From<PsRow> for ContainerHandle {
    fn from(row: PsRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            service: row.service,
            state: row.state,
            exit_code: row.exit_code,
        }
    }
}

/// Parse `ps` output. Older compose releases print one JSON array,
/// newer ones print one object per line.
fn parse_ps(output: &str) -> Result<Vec<ContainerHandle>> {
    let trimmed = output.trim();
    let rows: Vec<PsRow> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<PsRow>)
            .collect::<std::result::Result<_, _>>()?
    };
    Ok(rows.into_iter().map(ContainerHandle::from).collect())
}

fn parse_labels(output: &str) -> Result<HashMap<String, String>> {
    let labels: Option<HashMap<String, String>> = serde_json::from_str(output.trim())?;
    Ok(labels.unwrap_or_default())
}
