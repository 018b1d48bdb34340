//! Connection setup.

use anyhow::{Context, Result};
use rustls::ClientConfig;
use std::fmt;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, Config, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, error, warn};

/// libpq-style `sslmode`.
///
/// `prefer` and `require` encrypt without checking the server certificate.
/// The verify modes check the chain against the configured root certificate
/// (or the bundled web PKI roots) and the host name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    Disable,
    Prefer,
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

impl TlsMode {
    /// The mode handed to `tokio_postgres`, which only distinguishes
    /// whether TLS is off, attempted or mandatory.
    pub fn ssl_mode(self) -> SslMode {
        match self {
            TlsMode::Disable => SslMode::Disable,
            TlsMode::Prefer => SslMode::Prefer,
            TlsMode::Require | TlsMode::VerifyCa | TlsMode::VerifyFull => SslMode::Require,
        }
    }

    pub fn verifies_certificates(self) -> bool {
        matches!(self, TlsMode::VerifyCa | TlsMode::VerifyFull)
    }

    fn from_ssl_mode(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => TlsMode::Disable,
            SslMode::Require => TlsMode::Require,
            _ => TlsMode::Prefer,
        }
    }
}

impl FromStr for TlsMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(TlsMode::Disable),
            "allow" | "prefer" => Ok(TlsMode::Prefer),
            "require" => Ok(TlsMode::Require),
            "verify-ca" => Ok(TlsMode::VerifyCa),
            "verify-full" => Ok(TlsMode::VerifyFull),
            other => Err(anyhow::anyhow!(
                "Invalid sslmode '{other}'. Valid values: disable, allow, prefer, require, verify-ca, verify-full"
            )),
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TlsMode::Disable => "disable",
            TlsMode::Prefer => "prefer",
            TlsMode::Require => "require",
            TlsMode::VerifyCa => "verify-ca",
            TlsMode::VerifyFull => "verify-full",
        };
        f.write_str(s)
    }
}

/// Parse a libpq-style `sslmode` value.
pub fn parse_ssl_mode(value: &str) -> Result<TlsMode> {
    value.parse()
}

/// Everything needed to open a connection: the `tokio_postgres` settings
/// plus the TLS policy they cannot express.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub config: Config,
    pub tls: TlsMode,
    /// PEM bundle of trusted roots for the verify modes.
    pub root_cert: Option<PathBuf>,
}

impl ConnectConfig {
    pub fn new(mut config: Config, tls: TlsMode) -> Self {
        config.ssl_mode(tls.ssl_mode());
        Self {
            config,
            tls,
            root_cert: None,
        }
    }

    pub fn with_root_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_cert = Some(path.into());
        self
    }
}

/// Takes the TLS policy from the connection string's own `sslmode`.
impl From<Config> for ConnectConfig {
    fn from(config: Config) -> Self {
        let tls = TlsMode::from_ssl_mode(config.get_ssl_mode());
        Self::new(config, tls)
    }
}

/// Build the rustls client configuration for `connect`.
pub fn build_tls_config(connect: &ConnectConfig) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?;

    if !connect.tls.verifies_certificates() {
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(danger::NoCertificateVerification::new(
                provider,
            )))
            .with_no_client_auth());
    }

    let mut root_store = rustls::RootCertStore::empty();
    match &connect.root_cert {
        Some(path) => add_pem_roots(&mut root_store, path)?,
        None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(builder
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

fn add_pem_roots(root_store: &mut rustls::RootCertStore, path: &Path) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open root certificate {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse root certificate {}", path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("No certificates found in {}", path.display());
    }
    for cert in certs {
        root_store
            .add(cert)
            .with_context(|| format!("Failed to add root certificate from {}", path.display()))?;
    }
    Ok(())
}

/// Connect and spawn the connection driver.
///
/// `disable` connects in plain text; every other mode goes through rustls.
/// The session time zone is pinned to UTC so naive timestamps read and write
/// as UTC.
pub async fn new_postgresql_client(connect: &ConnectConfig) -> Result<Client> {
    let config = &connect.config;
    let client = match connect.tls {
        TlsMode::Disable => {
            let (client, connection) = config
                .connect(NoTls)
                .await
                .context("Failed to connect to PostgreSQL")?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("PostgreSQL connection error: {e}");
                }
            });
            client
        }
        mode => {
            if !mode.verifies_certificates() {
                warn!("sslmode={mode} encrypts without verifying the server certificate");
            }
            let tls = MakeRustlsConnect::new(build_tls_config(connect)?);
            let (client, connection) = config
                .connect(tls)
                .await
                .with_context(|| format!("Failed to connect to PostgreSQL with sslmode={mode}"))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("PostgreSQL connection error: {e}");
                }
            });
            client
        }
    };

    client
        .batch_execute("SET TIME ZONE 'UTC'")
        .await
        .context("Failed to set session time zone")?;

    debug!(
        "Connected to PostgreSQL database {:?} on {:?} (sslmode={})",
        config.get_dbname(),
        config.get_hosts(),
        connect.tls
    );
    Ok(client)
}

/// Connect and wrap the client for sharing between a target and its transactions.
pub async fn new_shared_client(connect: &ConnectConfig) -> Result<Arc<Mutex<Client>>> {
    Ok(Arc::new(Mutex::new(new_postgresql_client(connect).await?)))
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::CryptoProvider;
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};
    use std::sync::Arc;

    /// Accepts any server certificate but still checks handshake signatures.
    #[derive(Debug)]
    pub struct NoCertificateVerification(Arc<CryptoProvider>);

    impl NoCertificateVerification {
        pub fn new(provider: Arc<CryptoProvider>) -> Self {
            Self(provider)
        }
    }

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            rustls::crypto::verify_tls12_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            rustls::crypto::verify_tls13_signature(
                message,
                cert,
                dss,
                &self.0.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.signature_verification_algorithms.supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_ssl_mode() {
        assert_eq!(parse_ssl_mode("disable").unwrap(), TlsMode::Disable);
        assert_eq!(parse_ssl_mode("Prefer").unwrap(), TlsMode::Prefer);
        assert_eq!(parse_ssl_mode("allow").unwrap(), TlsMode::Prefer);
        assert_eq!(parse_ssl_mode("require").unwrap(), TlsMode::Require);
        assert_eq!(parse_ssl_mode("verify-ca").unwrap(), TlsMode::VerifyCa);
        assert_eq!(parse_ssl_mode("VERIFY-FULL").unwrap(), TlsMode::VerifyFull);
        assert!(parse_ssl_mode("sometimes").is_err());
    }

    #[test]
    fn test_verify_modes_keep_verification() {
        assert!(TlsMode::VerifyFull.verifies_certificates());
        assert!(TlsMode::VerifyCa.verifies_certificates());
        assert!(!TlsMode::Require.verifies_certificates());
        assert_eq!(TlsMode::VerifyFull.ssl_mode(), SslMode::Require);
        assert_eq!(TlsMode::default(), TlsMode::Require);
    }

    #[test]
    fn test_connect_config_sets_driver_ssl_mode() {
        let connect = ConnectConfig::new(Config::new(), TlsMode::VerifyFull);
        assert_eq!(connect.config.get_ssl_mode(), SslMode::Require);
        assert_eq!(connect.tls, TlsMode::VerifyFull);

        let connect = ConnectConfig::new(Config::new(), TlsMode::Disable);
        assert_eq!(connect.config.get_ssl_mode(), SslMode::Disable);
    }

    #[test]
    fn test_connection_string_sslmode_is_kept() {
        let config: Config = "host=db sslmode=require".parse().unwrap();
        assert_eq!(ConnectConfig::from(config).tls, TlsMode::Require);

        let config: Config = "host=db sslmode=disable".parse().unwrap();
        assert_eq!(ConnectConfig::from(config).tls, TlsMode::Disable);
    }

    #[test]
    fn test_build_tls_config_for_each_mode() {
        for mode in [TlsMode::Prefer, TlsMode::Require, TlsMode::VerifyFull] {
            let connect = ConnectConfig::new(Config::new(), mode);
            assert!(build_tls_config(&connect).is_ok(), "{mode}");
        }
    }

    #[test]
    fn test_verify_mode_rejects_unreadable_root_cert() {
        let connect = ConnectConfig::new(Config::new(), TlsMode::VerifyFull)
            .with_root_cert("/nonexistent/analytics-sync-ca.pem");
        let err = build_tls_config(&connect).unwrap_err();
        assert!(format!("{err:#}").contains("root certificate"));
    }

    #[test]
    fn test_verify_mode_rejects_empty_root_bundle() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a certificate").unwrap();
        let connect =
            ConnectConfig::new(Config::new(), TlsMode::VerifyCa).with_root_cert(file.path());
        let err = build_tls_config(&connect).unwrap_err();
        assert!(err.to_string().contains("No certificates found"));
    }

    #[tokio::test]
    async fn test_require_attempts_tls_instead_of_refusing() {
        let mut config = Config::new();
        config
            .host("127.0.0.1")
            .port(1)
            .dbname("analytics")
            .connect_timeout(std::time::Duration::from_millis(200));
        let connect = ConnectConfig::new(config, TlsMode::Require);
        let err = new_postgresql_client(&connect).await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to connect to PostgreSQL with sslmode=require"));
    }
}
