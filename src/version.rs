//! Version witnesses and their reconciliation
//!
//! The package version is declared once, in a plain text file holding a
//! single `MAJOR.MINOR.PATCH[-PRE][+BUILD]` line. Every other place the
//! version shows up (release tag, image label, the version container's
//! log) is a witness that has to agree with it.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Label carrying the image version.
pub const VERSION_LABEL: &str = "org.opencontainers.image.version";

/// The only prefix allowed on a release tag.
pub const TAG_PREFIX: &str = "v";

/// A validated package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageVersion(String);

impl PackageVersion {
    /// Read the version file at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::VersionFile`] when the file cannot be read or does not
    /// hold exactly one valid version line.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::VersionFile(format!("{}: {e}", path.display())))?;
        content
            .parse()
            .map_err(|e| Error::VersionFile(format!("{}: {e}", path.display())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageVersion {
    type Err = String;

    fn from_str(content: &str) -> std::result::Result<Self, String> {
        let line = content
            .strip_suffix('\n')
            .map_or(content, |l| l.strip_suffix('\r').unwrap_or(l));
        if line.contains('\n') {
            return Err("expected a single line".to_string());
        }
        if line.is_empty() {
            return Err("empty version".to_string());
        }
        validate(line)?;
        Ok(Self(line.to_string()))
    }
}

fn validate(version: &str) -> std::result::Result<(), String> {
    let (rest, build) = match version.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (version, None),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() != 3 {
        return Err(format!("{version:?} is not MAJOR.MINOR.PATCH"));
    }
    for part in parts {
        let numeric = !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !numeric || (part.len() > 1 && part.starts_with('0')) {
            return Err(format!("{version:?} has an invalid numeric part {part:?}"));
        }
    }

    for (what, ids) in [("pre-release", pre), ("build", build)] {
        let Some(ids) = ids else { continue };
        let valid = ids.split('.').all(|id| {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        });
        if !valid {
            return Err(format!("{version:?} has an invalid {what} part"));
        }
    }
    Ok(())
}

/// Where a version observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Witness {
    File,
    Tag,
    Label,
    Log,
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Tag => "release tag",
            Self::Label => "label",
            Self::Log => "log",
        })
    }
}

/// Outcome of comparing every present witness to the file version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Reconciliation {
    Match,
    Mismatch {
        witness: Witness,
        expected: String,
        actual: String,
    },
}

/// Compare the witnesses against `file_version`.
///
/// The tag, when present, must be `v` followed by the file version; the
/// label and log must equal it exactly. Absent witnesses are skipped.
/// The first disagreement in tag, label, log order is reported.
#[must_use]
pub fn reconcile(
    file_version: &str,
    tag_version: Option<&str>,
    label_version: Option<&str>,
    log_version: Option<&str>,
) -> Reconciliation {
    let expected_tag = format!("{TAG_PREFIX}{file_version}");
    let checks = [
        (Witness::Tag, tag_version, expected_tag.as_str()),
        (Witness::Label, label_version, file_version),
        (Witness::Log, log_version, file_version),
    ];

    for (witness, actual, expected) in checks {
        if let Some(actual) = actual
            && actual != expected
        {
            return Reconciliation::Mismatch {
                witness,
                expected: expected.to_string(),
                actual: actual.to_string(),
            };
        }
    }
    Reconciliation::Match
}

/// One version with every witness that was observed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    pub file: PackageVersion,
    pub tag: Option<String>,
    pub label: Option<String>,
    pub log: Option<String>,
}

impl VersionRecord {
    #[must_use]
    pub const fn new(file: PackageVersion) -> Self {
        Self {
            file,
            tag: None,
            label: None,
            log: None,
        }
    }

    #[must_use]
    pub fn reconcile(&self) -> Reconciliation {
        reconcile(
            self.file.as_str(),
            self.tag.as_deref(),
            self.label.as_deref(),
            self.log.as_deref(),
        )
    }

    /// Reconcile and turn a mismatch into [`Error::VersionMismatch`]
    /// listing every witness.
    ///
    /// # Errors
    ///
    /// [`Error::VersionMismatch`] on the first disagreeing witness.
    pub fn verify(&self) -> Result<()> {
        match self.reconcile() {
            Reconciliation::Match => Ok(()),
            Reconciliation::Mismatch {
                witness,
                expected,
                actual,
            } => Err(Error::VersionMismatch {
                witness: witness.to_string(),
                expected,
                actual,
                witnesses: self.summary(),
            }),
        }
    }

    /// `file=3.2.1 tag=v3.2.1 label=3.2.1 log=<absent>`
    #[must_use]
    pub fn summary(&self) -> String {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "<absent>".to_string());
        format!(
            "file={} tag={} label={} log={}",
            self.file,
            show(&self.tag),
            show(&self.label),
            show(&self.log)
        )
    }
}
