//! Composition-level checks: shape, readiness, run-once exits

use crate::compose::{ContainerRuntime, wait_for_exit};
use crate::environment::TestEnvironment;
use crate::error::{Error, Result};
use crate::readiness::{Ready, await_ready};

/// The composition holds exactly the expected number of containers,
/// running or stopped.
///
/// # Errors
///
/// [`Error::Composition`] on a count mismatch.
pub async fn composition_shape<R: ContainerRuntime>(env: &TestEnvironment<R>) -> Result<usize> {
    let expected = env.config().composition.expected_containers;
    let containers = env.runtime().list_containers(&[], true).await?;
    if containers.len() != expected {
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        return Err(Error::Composition(format!(
            "expected {expected} containers, found {}: [{}]",
            containers.len(),
            names.join(", ")
        )));
    }
    Ok(containers.len())
}

/// Block until the main container logs the readiness sentinel.
///
/// # Errors
///
/// [`Error::ReadinessTimeout`] when the sentinel does not show up in time.
pub async fn readiness_gate<R: ContainerRuntime>(env: &TestEnvironment<R>) -> Result<Ready> {
    await_ready(env.runtime(), env.main_container(), &env.config().readiness).await
}

/// The version container runs once and must exit with code 0. Returns
/// `None` when the topology has no version container.
///
/// # Errors
///
/// [`Error::ExitTimeout`] or [`Error::ExitCode`].
pub async fn version_reporter_exit<R: ContainerRuntime>(
    env: &TestEnvironment<R>,
) -> Result<Option<i64>> {
    let Some(container) = env.version_container() else {
        return Ok(None);
    };
    let code = wait_for_exit(
        env.runtime(),
        container,
        env.config().composition.exit_timeout,
    )
    .await?;
    if code != 0 {
        return Err(Error::ExitCode {
            container: container.name.clone(),
            code,
        });
    }
    Ok(Some(code))
}
