//! Harness configuration
//!
//! Everything the harness needs to find the composition and talk to
//! the mail service comes from environment variables (optionally via a
//! `.env` file). [`HarnessConfig::from_lookup`] takes the lookup as a
//! function so the parsing can be exercised without touching the
//! process environment.

use crate::error::{Error, Result};
use crate::readiness::ReadinessProbe;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the mailbox endpoint encrypts its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// TLS from the first byte (IMAPS).
    #[default]
    Implicit,
    /// Plain greeting, then a `STARTTLS` upgrade.
    StartTls,
}

impl FromStr for TlsMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "implicit" | "tls" | "imaps" => Ok(Self::Implicit),
            "starttls" => Ok(Self::StartTls),
            other => Err(Error::Config(format!("Invalid IMAP TLS mode: {other}"))),
        }
    }
}

/// A mailbox identity: login credentials plus the address mail is
/// delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub password: String,
    pub address: String,
}

impl Principal {
    #[must_use]
    pub fn new(username: &str, password: &str, domain: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            address: format!("{username}@{domain}"),
        }
    }
}

/// Connection settings for the mailbox (IMAP) endpoint.
#[derive(Debug, Clone)]
pub struct ImapSettings {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    pub io_timeout: Duration,
}

/// Connection settings for the submission (SMTP) endpoints.
#[derive(Debug, Clone)]
pub struct SubmissionSettings {
    pub host: String,
    /// One entry per ingestion policy under test.
    pub ports: Vec<u16>,
    pub helo: String,
    pub sender: String,
    pub io_timeout: Duration,
}

/// Which services make up the composition and how to reach them.
#[derive(Debug, Clone)]
pub struct CompositionSettings {
    pub main_service: String,
    pub version_service: Option<String>,
    pub expected_containers: usize,
    pub compose_files: Vec<PathBuf>,
    pub project: Option<String>,
    pub exit_timeout: Duration,
}

/// Sources for the version witnesses that are not read from containers.
#[derive(Debug, Clone)]
pub struct VersionSettings {
    pub version_file: PathBuf,
    pub release_tag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub imap: ImapSettings,
    pub submission: SubmissionSettings,
    pub principals: Vec<Principal>,
    pub readiness: ReadinessProbe,
    pub delivery_timeout: Duration,
    pub composition: CompositionSettings,
    pub version: VersionSettings,
}

impl HarnessConfig {
    /// Load configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `MAILSTACK_PRINCIPALS` (`user:password[,user:password...]`)
    ///
    /// Everything else has a default (`MAILSTACK_HOST`, `MAILSTACK_SMTP_PORTS`,
    /// `MAILSTACK_IMAP_PORT`, `MAILSTACK_IMAP_TLS`, timeouts, service names,
    /// `MAILSTACK_VERSION_FILE`, `RELEASE_TAG`, ...).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("MAILSTACK_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let io_timeout = Duration::from_secs(parse_or(&var, "MAILSTACK_IO_TIMEOUT_SECS", 10)?);

        let domain = var("MAILSTACK_MAIL_DOMAIN").unwrap_or_else(|| "example.com".to_string());
        let principals = parse_principals(
            &var("MAILSTACK_PRINCIPALS")
                .ok_or_else(|| Error::Config("MAILSTACK_PRINCIPALS not set".into()))?,
            &domain,
        )?;

        let ports = parse_ports(
            &var("MAILSTACK_SMTP_PORTS").unwrap_or_else(|| "1025,1587".to_string()),
        )?;

        let imap = ImapSettings {
            host: host.clone(),
            port: parse_or(&var, "MAILSTACK_IMAP_PORT", 1993)?,
            tls: var("MAILSTACK_IMAP_TLS")
                .map(|v| v.parse::<TlsMode>())
                .transpose()?
                .unwrap_or_default(),
            io_timeout,
        };

        let submission = SubmissionSettings {
            host,
            ports,
            helo: var("MAILSTACK_SMTP_HELO").unwrap_or_else(|| "mailstack.test".to_string()),
            sender: var("MAILSTACK_SENDER").unwrap_or_else(|| format!("mailstack@{domain}")),
            io_timeout,
        };

        let readiness = ReadinessProbe {
            sentinel: var("MAILSTACK_READY_SENTINEL")
                .unwrap_or_else(|| "daemon started".to_string()),
            timeout: Duration::from_secs(parse_or(&var, "MAILSTACK_READY_TIMEOUT_SECS", 10)?),
            poll_interval: Duration::from_millis(parse_or(
                &var,
                "MAILSTACK_POLL_INTERVAL_MS",
                1000,
            )?),
        };

        let version_service = var("MAILSTACK_VERSION_SERVICE");
        let default_count = 1 + usize::from(version_service.is_some());
        let composition = CompositionSettings {
            main_service: var("MAILSTACK_MAIN_SERVICE").unwrap_or_else(|| "postfix".to_string()),
            expected_containers: parse_or(&var, "MAILSTACK_EXPECTED_CONTAINERS", default_count)?,
            version_service,
            compose_files: var("MAILSTACK_COMPOSE_FILES")
                .map(|v| split_list(&v).map(PathBuf::from).collect())
                .unwrap_or_default(),
            project: var("MAILSTACK_COMPOSE_PROJECT"),
            exit_timeout: Duration::from_secs(parse_or(&var, "MAILSTACK_EXIT_TIMEOUT_SECS", 30)?),
        };

        let version = VersionSettings {
            version_file: var("MAILSTACK_VERSION_FILE")
                .map_or_else(|| PathBuf::from("src/version.txt"), PathBuf::from),
            release_tag: var("RELEASE_TAG"),
        };

        Ok(Self {
            imap,
            submission,
            principals,
            readiness,
            delivery_timeout: Duration::from_secs(parse_or(
                &var,
                "MAILSTACK_DELIVERY_TIMEOUT_SECS",
                30,
            )?),
            composition,
            version,
        })
    }

    /// Look up a configured principal by login name.
    #[must_use]
    pub fn principal(&self, username: &str) -> Option<&Principal> {
        self.principals.iter().find(|p| p.username == username)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {key}: {e}")))
    })
}

fn parse_ports(value: &str) -> Result<Vec<u16>> {
    let ports = split_list(value)
        .map(|p| {
            p.parse()
                .map_err(|e| Error::Config(format!("Invalid SMTP port {p:?}: {e}")))
        })
        .collect::<Result<Vec<u16>>>()?;
    if ports.is_empty() {
        return Err(Error::Config("MAILSTACK_SMTP_PORTS is empty".into()));
    }
    Ok(ports)
}

fn parse_principals(value: &str, domain: &str) -> Result<Vec<Principal>> {
    let principals = split_list(value)
        .map(|entry| {
            let (user, password) = entry.split_once(':').ok_or_else(|| {
                Error::Config(format!("Principal {entry:?} is not user:password"))
            })?;
            if user.is_empty() {
                return Err(Error::Config(format!("Principal {entry:?} has no user")));
            }
            Ok(Principal::new(user, password, domain))
        })
        .collect::<Result<Vec<_>>>()?;
    if principals.is_empty() {
        return Err(Error::Config("MAILSTACK_PRINCIPALS is empty".into()));
    }
    Ok(principals)
}
