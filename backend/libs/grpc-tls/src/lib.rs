//! gRPC TLS configuration for the greeter server and client
//!
//! TLS is optional: both sides run in plaintext unless the certificate
//! paths are configured. Certificates are read as PEM from disk.

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::Path;
use tonic::transport::{Certificate, ClientTlsConfig, Identity, ServerTlsConfig};
use tracing::{info, warn};

pub mod cert_generation;
pub use cert_generation::{generate_dev_certificates, write_cert_bundle, CertificateBundle};

const SERVER_CERT_PATH_VAR: &str = "GRPC_SERVER_CERT_PATH";
const SERVER_KEY_PATH_VAR: &str = "GRPC_SERVER_KEY_PATH";
const SERVER_CA_CERT_PATH_VAR: &str = "GRPC_SERVER_CA_CERT_PATH";
const SERVER_DOMAIN_VAR: &str = "GRPC_SERVER_DOMAIN";

fn read_pem(path: &Path, what: &str) -> Result<String> {
    let pem = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from {}", what, path.display()))?;
    if !pem.contains("-----BEGIN") {
        bail!("{} at {} is not PEM encoded", what, path.display());
    }
    Ok(pem)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// TLS configuration for gRPC server
#[derive(Clone)]
pub struct GrpcServerTlsConfig {
    /// Server certificate (PEM format)
    pub cert_pem: String,
    /// Server private key (PEM format)
    pub key_pem: String,
}

impl GrpcServerTlsConfig {
    pub fn from_paths(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_pem = read_pem(cert_path.as_ref(), "server certificate")?;
        let key_pem = read_pem(key_path.as_ref(), "server key")?;

        info!(
            cert_path = %cert_path.as_ref().display(),
            "gRPC server TLS configuration loaded"
        );

        Ok(Self { cert_pem, key_pem })
    }

    /// Load server TLS config from environment variables
    ///
    /// **Environment Variables**:
    /// - `GRPC_SERVER_CERT_PATH`: Path to server certificate PEM file
    /// - `GRPC_SERVER_KEY_PATH`: Path to server private key PEM file
    ///
    /// Returns `Ok(None)` when neither is set. Setting only one is an error.
    pub fn from_env() -> Result<Option<Self>> {
        match (non_empty_var(SERVER_CERT_PATH_VAR), non_empty_var(SERVER_KEY_PATH_VAR)) {
            (Some(cert_path), Some(key_path)) => Self::from_paths(cert_path, key_path).map(Some),
            (None, None) => Ok(None),
            (Some(_), None) => Err(anyhow!("{SERVER_CERT_PATH_VAR} is set but {SERVER_KEY_PATH_VAR} is not")),
            (None, Some(_)) => Err(anyhow!("{SERVER_KEY_PATH_VAR} is set but {SERVER_CERT_PATH_VAR} is not")),
        }
    }

    /// Create development config with freshly generated certificates
    ///
    /// The bundle is written to `output_dir` so clients can trust
    /// `<output_dir>/ca.crt` through `GRPC_SERVER_CA_CERT_PATH`.
    ///
    /// **WARNING**: Only use in development/testing, NEVER in production
    pub fn development(output_dir: impl AsRef<Path>) -> Result<Self> {
        warn!("Using development TLS config with generated certificates - NOT for production");

        let bundle = generate_dev_certificates()?;
        write_cert_bundle(&bundle, output_dir.as_ref())?;

        Ok(Self {
            cert_pem: bundle.server_cert,
            key_pem: bundle.server_key,
        })
    }

    /// Build tonic ServerTlsConfig
    pub fn build_server_tls(&self) -> Result<ServerTlsConfig> {
        let identity = Identity::from_pem(&self.cert_pem, &self.key_pem);
        Ok(ServerTlsConfig::new().identity(identity))
    }
}

/// TLS configuration for gRPC client
#[derive(Clone)]
pub struct GrpcClientTlsConfig {
    /// Server CA certificate to trust (PEM format)
    pub server_ca_cert: String,
    /// Server domain name for certificate validation
    pub domain_name: String,
}

impl GrpcClientTlsConfig {
    pub fn from_paths(ca_cert_path: impl AsRef<Path>, domain_name: impl Into<String>) -> Result<Self> {
        let server_ca_cert = read_pem(ca_cert_path.as_ref(), "server CA certificate")?;
        let domain_name = domain_name.into();

        info!(domain = %domain_name, "gRPC client TLS configuration loaded");

        Ok(Self {
            server_ca_cert,
            domain_name,
        })
    }

    /// Load client TLS config from environment variables
    ///
    /// **Environment Variables**:
    /// - `GRPC_SERVER_CA_CERT_PATH`: Path to server CA certificate
    /// - `GRPC_SERVER_DOMAIN`: Server domain name (default: "localhost")
    ///
    /// Returns `Ok(None)` when no CA certificate is configured.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(ca_cert_path) = non_empty_var(SERVER_CA_CERT_PATH_VAR) else {
            return Ok(None);
        };

        let domain_name =
            non_empty_var(SERVER_DOMAIN_VAR).unwrap_or_else(|| "localhost".to_string());

        Self::from_paths(ca_cert_path, domain_name).map(Some)
    }

    /// Build tonic ClientTlsConfig
    pub fn build_client_tls(&self) -> Result<ClientTlsConfig> {
        let server_ca = Certificate::from_pem(&self.server_ca_cert);

        Ok(ClientTlsConfig::new()
            .ca_certificate(server_ca)
            .domain_name(&self.domain_name))
    }
}

/// Validate certificate expiration, returning the days left
///
/// Logs a warning when fewer than `warn_days_before` days remain.
pub fn validate_cert_expiration(cert_pem: &str, warn_days_before: u64) -> Result<i64> {
    use x509_parser::prelude::*;

    let pem = ::pem::parse(cert_pem).map_err(|e| anyhow!("Failed to parse PEM: {}", e))?;

    let (_, cert) = X509Certificate::from_der(pem.contents())
        .map_err(|e| anyhow!("Failed to parse X.509 certificate: {}", e))?;

    let expiry_timestamp = cert.validity().not_after.timestamp();
    let now = chrono::Utc::now().timestamp();
    let days_until_expiry = (expiry_timestamp - now) / 86400;

    if expiry_timestamp < now {
        return Err(anyhow!("Certificate has expired"));
    }

    if days_until_expiry < warn_days_before as i64 {
        warn!(
            days_remaining = days_until_expiry,
            "Certificate expiring soon - rotation recommended"
        );
    }

    Ok(days_until_expiry)
}
