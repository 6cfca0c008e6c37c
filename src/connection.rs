//! IMAP connection and TLS helpers
//!
//! Opens the encrypted transport ([`TlsMode::Implicit`] or the
//! `STARTTLS` upgrade) and logs in. Everything after login lives in
//! [`crate::mailbox`].

use crate::config::{ImapSettings, Principal, TlsMode};
use crate::error::{Error, Result};
use async_imap::Session;
use async_imap::error::Error as ImapError;
use async_imap::imap_proto::{Response, Status};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// A TLS-wrapped IMAP session.
pub type ImapSession = Session<Compat<TlsStream<TcpStream>>>;

/// Build a TLS connector that accepts all certificates.
///
/// The mail container serves a self-signed certificate generated at
/// build time, so verification is skipped entirely.
fn tls_connector() -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("No usable TLS versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

async fn tls_handshake(host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;
    tls_connector()?
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Tls(e.to_string()))
}

/// Open the encrypted transport and return an unauthenticated client.
async fn open(settings: &ImapSettings) -> Result<async_imap::Client<Compat<TlsStream<TcpStream>>>> {
    let addr = format!("{}:{}", settings.host, settings.port);
    debug!("Connecting to IMAP server at {} ({:?})", addr, settings.tls);

    let tcp_stream = TcpStream::connect(&addr).await?;

    match settings.tls {
        TlsMode::Implicit => {
            let tls_stream = tls_handshake(&settings.host, tcp_stream).await?;
            let mut client = async_imap::Client::new(tls_stream.compat());
            match client.read_response().await {
                Ok(data) => check_greeting(Ok(data.as_ref().map(|d| d.parsed())))?,
                Err(e) => check_greeting(Err(e))?,
            }
            Ok(client)
        }
        TlsMode::StartTls => {
            let mut client = async_imap::Client::new(tcp_stream.compat());
            match client.read_response().await {
                Ok(data) => check_greeting(Ok(data.as_ref().map(|d| d.parsed())))?,
                Err(e) => check_greeting(Err(e))?,
            }
            client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;

            let inner = client.into_inner().into_inner();
            let tls_stream = tls_handshake(&settings.host, inner).await?;
            Ok(async_imap::Client::new(tls_stream.compat()))
        }
    }
}

/// The server must open with `* OK` (or `* PREAUTH`). A `* BYE`, a
/// closed connection or garbage is a protocol error.
fn check_greeting(greeting: std::io::Result<Option<&Response<'_>>>) -> Result<()> {
    let data = match greeting {
        Ok(Some(data)) => data,
        Ok(None) => return Err(Error::protocol("greeting", "* OK", "connection closed")),
        Err(e) => return Err(Error::protocol("greeting", "* OK", e.to_string())),
    };
    match data {
        Response::Data {
            status: Status::Ok | Status::PreAuth,
            ..
        } => Ok(()),
        Response::Data {
            status,
            information,
            ..
        } => {
            let status = format!("{status:?}").to_ascii_uppercase();
            let text = information.as_deref().unwrap_or_default();
            Err(Error::protocol("greeting", "* OK", format!("* {status} {text}")))
        }
        other => Err(Error::protocol("greeting", "* OK", format!("{other:?}"))),
    }
}

/// Map a failed LOGIN. Only a tagged `NO` is a credential rejection;
/// `BAD` means the server did not understand the command at all.
fn login_error(user: &str, err: ImapError) -> Error {
    match err {
        ImapError::No(reason) => Error::Auth {
            user: user.to_string(),
            reason,
        },
        ImapError::Bad(msg) => Error::protocol("LOGIN", "OK or NO", format!("BAD {msg}")),
        ImapError::Io(io) => Error::Io(io),
        other => Error::Imap(format!("LOGIN: {other}")),
    }
}

/// Connect and log in as `principal`.
///
/// A `NO` to LOGIN (unknown user, wrong password) is reported as
/// [`Error::Auth`]; the server does not reliably tell those apart.
pub async fn connect(settings: &ImapSettings, principal: &Principal) -> Result<ImapSession> {
    let timeout = settings.io_timeout;
    let client = tokio::time::timeout(timeout, open(settings))
        .await
        .map_err(|_| Error::Timeout {
            operation: format!("IMAP connect to {}:{}", settings.host, settings.port),
            after: timeout,
        })??;

    let session = tokio::time::timeout(
        timeout,
        client.login(&principal.username, &principal.password),
    )
    .await
    .map_err(|_| Error::Timeout {
        operation: "LOGIN".to_string(),
        after: timeout,
    })?
    .map_err(|(e, _)| login_error(&principal.username, e))?;

    info!("Logged in to IMAP server as {}", principal.username);
    Ok(session)
}

/// Certificate verifier that accepts all certificates
/// (for self-signed test containers).
#[derive(Debug)]
struct AcceptAnyCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
