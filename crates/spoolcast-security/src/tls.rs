// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TLS client context for LAN printers.
//
// Printers present a certificate chain issued by the vendor's own CA and are
// addressed by IP, so the context:
//   - trusts exactly one local CA file (no public web roots),
//   - skips the server-name check (the certificate names the device serial,
//     never the IP it was reached on),
//   - does not demand key-usage extensions on the CA, which some printer CAs
//     lack.
//
// The chain signature, validity period, and handshake signatures are still
// verified against the CA.
//
// Built once per `TlsContextProvider` and shared by the FTPS and MQTT clients.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{Resumption, verify_server_cert_signed_by_trust_anchor};
use rustls::crypto::{WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, info, instrument};

use spoolcast_core::error::{Result, SpoolcastError};
use spoolcast_core::executable_dir;

/// Where the printer CA lives, relative to the executable's directory.
pub const DEFAULT_CA_RELATIVE_PATH: &str = "settings/printer-ca.pem";

/// Sessions kept for resumption. The FTPS data channel must resume the
/// control channel's session, so one per printer is enough; a few spare slots
/// cover a pipeline that talks to more than one.
const SESSION_CACHE_SIZE: usize = 32;

/// Immutable TLS client configuration shared by every printer connection.
///
/// Cloning is cheap and yields a handle to the same underlying configuration,
/// including its session cache.
#[derive(Clone)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
}

impl TlsContext {
    /// Build a context trusting the PEM certificates in `path`.
    #[instrument]
    pub fn from_ca_file(path: &Path) -> Result<Self> {
        let pem = std::fs::read(path).map_err(|e| {
            SpoolcastError::Configuration(format!(
                "cannot read printer CA {}: {e}",
                path.display()
            ))
        })?;
        Self::from_ca_pem(&pem).map_err(|e| match e {
            SpoolcastError::Configuration(msg) => {
                SpoolcastError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Build a context trusting the PEM certificates in `pem`.
    pub fn from_ca_pem(pem: &[u8]) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        for cert in CertificateDer::pem_slice_iter(pem) {
            let cert = cert.map_err(|e| {
                SpoolcastError::Configuration(format!("unparsable CA certificate: {e}"))
            })?;
            roots.add(cert).map_err(|e| {
                SpoolcastError::Configuration(format!("CA certificate rejected: {e}"))
            })?;
        }
        if roots.is_empty() {
            return Err(SpoolcastError::Configuration(
                "no certificates found in CA file".into(),
            ));
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = Arc::new(LanCertVerifier {
            roots: Arc::new(roots),
            algorithms: provider.signature_verification_algorithms,
        });

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| SpoolcastError::Configuration(format!("TLS protocol setup: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();
        config.resumption = Resumption::in_memory_sessions(SESSION_CACHE_SIZE);

        debug!("printer TLS context built");
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// The rustls configuration, for handing to connectors.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    /// Whether both handles point at the same configuration.
    pub fn same_as(&self, other: &TlsContext) -> bool {
        Arc::ptr_eq(&self.config, &other.config)
    }
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("config", &Arc::as_ptr(&self.config))
            .finish()
    }
}

type ContextBuilder = Box<dyn Fn() -> Result<TlsContext> + Send + Sync>;

/// Lazily builds one `TlsContext` and hands out the cached instance after.
///
/// Owned by the application context and passed to both transport branches.
/// A failed build is not cached, but a missing certificate is fatal to the
/// caller anyway.
pub struct TlsContextProvider {
    cell: OnceCell<TlsContext>,
    build: ContextBuilder,
}

impl TlsContextProvider {
    /// Provider that loads the CA from `path` on first use.
    pub fn from_ca_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::with_builder(move || TlsContext::from_ca_file(&path))
    }

    /// Provider that loads the CA from [`DEFAULT_CA_RELATIVE_PATH`] next to
    /// the running executable.
    pub fn beside_executable() -> Result<Self> {
        Ok(Self::from_ca_file(default_ca_path()?))
    }

    /// Provider with a custom build step.
    pub fn with_builder<F>(build: F) -> Self
    where
        F: Fn() -> Result<TlsContext> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            build: Box::new(build),
        }
    }

    /// Return the shared context, building it on the first call.
    pub fn shared_context(&self) -> Result<TlsContext> {
        self.cell
            .get_or_try_init(|| {
                let context = (self.build)()?;
                info!("printer TLS context ready");
                Ok(context)
            })
            .cloned()
    }
}

impl fmt::Debug for TlsContextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContextProvider")
            .field("built", &self.cell.get().is_some())
            .finish()
    }
}

/// Resolve [`DEFAULT_CA_RELATIVE_PATH`] against the executable's directory.
pub fn default_ca_path() -> Result<PathBuf> {
    Ok(executable_dir()?.join(DEFAULT_CA_RELATIVE_PATH))
}

/// Chain-only verifier: signature and validity against the printer CA, no
/// server-name match.
#[derive(Debug)]
struct LanCertVerifier {
    roots: Arc<RootCertStore>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for LanCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let cert = ParsedCertificate::try_from(end_entity)?;
        verify_server_cert_signed_by_trust_anchor(
            &cert,
            &self.roots,
            intermediates,
            now,
            self.algorithms.all,
        )?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
