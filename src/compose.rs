//! Composition controller boundary
//!
//! The harness never builds or schedules containers itself. It talks
//! to whatever runs the composition through [`ContainerRuntime`]; the
//! production implementation is [`crate::DockerCompose`].

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// A container belonging to the composition, possibly already stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub service: String,
    /// Runtime state as reported by the controller (`running`, `exited`, ...).
    pub state: String,
    pub exit_code: Option<i64>,
}

impl ContainerHandle {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Operations the harness needs from the thing running the composition.
///
/// All queries are read-only and may be issued while a container is
/// running or after it has exited.
pub trait ContainerRuntime {
    /// Create and start the composition.
    fn up(&self) -> impl Future<Output = Result<()>> + Send;

    /// Stop and remove the composition.
    fn down(&self) -> impl Future<Output = Result<()>> + Send;

    /// List containers for the given services (all services when
    /// `services` is empty). `include_stopped` also returns exited
    /// containers.
    fn list_containers(
        &self,
        services: &[&str],
        include_stopped: bool,
    ) -> impl Future<Output = Result<Vec<ContainerHandle>>> + Send;

    /// The full log text accumulated so far.
    fn logs(&self, id: &str) -> impl Future<Output = Result<String>> + Send;

    /// The container's label mapping.
    fn labels(&self, id: &str) -> impl Future<Output = Result<HashMap<String, String>>> + Send;

    /// Block until the container exits and return its exit code.
    fn wait(&self, id: &str) -> impl Future<Output = Result<i64>> + Send;
}

/// Find the single container of `service`, even if it already stopped.
pub async fn find_service<R: ContainerRuntime>(
    runtime: &R,
    service: &str,
) -> Result<ContainerHandle> {
    let mut containers = runtime.list_containers(&[service], true).await?;
    match containers.len() {
        1 => Ok(containers.remove(0)),
        0 => Err(Error::Composition(format!(
            "no container found for service {service}"
        ))),
        n => Err(Error::Composition(format!(
            "expected 1 container for service {service}, found {n}"
        ))),
    }
}

/// Wait for `container` to exit, giving up after `timeout`.
pub async fn wait_for_exit<R: ContainerRuntime>(
    runtime: &R,
    container: &ContainerHandle,
    timeout: Duration,
) -> Result<i64> {
    debug!("Waiting up to {:?} for {} to exit", timeout, container.name);
    let code = tokio::time::timeout(timeout, runtime.wait(&container.id))
        .await
        .map_err(|_| Error::ExitTimeout {
            container: container.name.clone(),
            timeout,
        })??;
    info!("{} exited with code {}", container.name, code);
    Ok(code)
}
