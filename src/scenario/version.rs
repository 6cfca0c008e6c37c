//! Version agreement across file, tag, label and log

use crate::compose::{ContainerRuntime, wait_for_exit};
use crate::environment::TestEnvironment;
use crate::error::{Error, Result};
use crate::version::{PackageVersion, VERSION_LABEL, VersionRecord};

/// Collect every available witness and require them to agree with the
/// version file.
///
/// The label comes from the version container when there is one, else
/// from the main container, and must be present. The log witness only
/// exists when there is a version container; the tag only in a release
/// run.
///
/// # Errors
///
/// [`Error::VersionFile`] for an unreadable version file,
/// [`Error::VersionMismatch`] on any disagreement (including a missing
/// label).
pub async fn version_agreement<R: ContainerRuntime>(
    env: &TestEnvironment<R>,
) -> Result<VersionRecord> {
    let config = env.config();
    let runtime = env.runtime();
    let mut record = VersionRecord::new(PackageVersion::load(&config.version.version_file)?);
    record.tag.clone_from(&config.version.release_tag);

    let labelled = env.version_container().unwrap_or(env.main_container());
    let labels = runtime.labels(&labelled.id).await?;
    record.label = labels.get(VERSION_LABEL).cloned();
    if record.label.is_none() {
        return Err(Error::VersionMismatch {
            witness: "label".to_string(),
            expected: record.file.to_string(),
            actual: format!("no {VERSION_LABEL} label on {}", labelled.name),
            witnesses: record.summary(),
        });
    }

    if let Some(container) = env.version_container() {
        wait_for_exit(runtime, container, config.composition.exit_timeout).await?;
        let output = runtime.logs(&container.id).await?;
        record.log = Some(output.trim().to_string());
    }

    record.verify()?;
    Ok(record)
}
