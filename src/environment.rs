//! The composition under test, set up once per session
//!
//! [`TestEnvironment`] is built explicitly before any scenario runs and
//! passed by reference into each one; [`TestEnvironment::teardown`]
//! ends the session.

use crate::compose::{ContainerHandle, ContainerRuntime, find_service};
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::submission::SubmissionDriver;
use tracing::{info, warn};

pub struct TestEnvironment<R> {
    runtime: R,
    config: HarnessConfig,
    main: ContainerHandle,
    version: Option<ContainerHandle>,
    owns_composition: bool,
}

impl<R: ContainerRuntime> TestEnvironment<R> {
    /// Start the composition and resolve the configured services. If
    /// resolving fails, the composition is stopped again before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Any failure from the runtime, or [`crate::Error::Composition`]
    /// when a configured service has no container.
    pub async fn setup(runtime: R, config: HarnessConfig) -> Result<Self> {
        info!("Starting composition");
        runtime.up().await?;
        let (main, version) = match Self::find_services(&runtime, &config).await {
            Ok(found) => found,
            Err(e) => {
                if let Err(down) = runtime.down().await {
                    warn!("Stopping composition after failed setup failed: {}", down);
                }
                return Err(e);
            }
        };
        Ok(Self::new(runtime, config, main, version, true))
    }

    /// Use a composition somebody else already started. Teardown leaves
    /// it running.
    ///
    /// # Errors
    ///
    /// See [`TestEnvironment::setup`].
    pub async fn attach(runtime: R, config: HarnessConfig) -> Result<Self> {
        let (main, version) = Self::find_services(&runtime, &config).await?;
        Ok(Self::new(runtime, config, main, version, false))
    }

    async fn find_services(
        runtime: &R,
        config: &HarnessConfig,
    ) -> Result<(ContainerHandle, Option<ContainerHandle>)> {
        let main = find_service(runtime, &config.composition.main_service).await?;
        let version = match &config.composition.version_service {
            Some(service) => Some(find_service(runtime, service).await?),
            None => None,
        };
        info!(
            "Main container {} ({}), version container {}",
            main.name,
            main.id,
            version.as_ref().map_or("<none>", |v| v.name.as_str())
        );
        Ok((main, version))
    }

    const fn new(
        runtime: R,
        config: HarnessConfig,
        main: ContainerHandle,
        version: Option<ContainerHandle>,
        owns_composition: bool,
    ) -> Self {
        Self {
            runtime,
            config,
            main,
            version,
            owns_composition,
        }
    }

    /// Stop the composition if this environment started it.
    ///
    /// # Errors
    ///
    /// Any failure from the runtime's `down`.
    pub async fn teardown(self) -> Result<()> {
        if self.owns_composition {
            info!("Stopping composition");
            self.runtime.down().await?;
        }
        Ok(())
    }

    pub const fn runtime(&self) -> &R {
        &self.runtime
    }

    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The long-running mail service container.
    pub const fn main_container(&self) -> &ContainerHandle {
        &self.main
    }

    /// The run-once version reporter, when the topology has one.
    pub const fn version_container(&self) -> Option<&ContainerHandle> {
        self.version.as_ref()
    }

    #[must_use]
    pub fn submission(&self) -> SubmissionDriver {
        SubmissionDriver::new(self.config.submission.clone())
    }
}
