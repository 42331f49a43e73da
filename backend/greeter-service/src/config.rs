//! Configuration management for Greeter Service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use greeter_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Listening on {}", settings.server.addr()?);
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use crypto_core::{ClaimConstraint, SecretKey, ValidationConstraints};
use grpc_tls::GrpcServerTlsConfig;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::dispatcher::DEFAULT_STREAM_PACING;
use crate::worker_pool::DEFAULT_WORKER_POOL_SIZE;

/// Default `RUST_LOG` filter for both binaries
pub const DEFAULT_LOG_FILTER: &str = "greeter_service=info,grpc_jwt_auth=info,info";

fn load_dotenv() {
    // Load .env file in development
    if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
        info!("Loaded .env file for development");
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        _ => Ok(default),
    }
}

fn required_secret() -> Result<SecretKey> {
    let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
    if secret.is_empty() {
        bail!("JWT_SECRET must not be empty");
    }
    Ok(SecretKey::from(secret))
}

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub jwt: JwtSettings,
    pub dispatch: DispatchSettings,
    /// `development`, `staging` or `production`
    pub app_env: String,
    /// Where to write generated certificates when no TLS paths are set
    pub dev_cert_dir: Option<PathBuf>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        load_dotenv();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            server: ServerSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            dispatch: DispatchSettings::from_env()?,
            app_env: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string())
                .to_ascii_lowercase(),
            dev_cert_dir: env::var("GRPC_DEV_CERT_DIR")
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// TLS is mandatory outside development
    pub fn tls_required(&self) -> bool {
        matches!(self.app_env.as_str(), "production" | "staging")
    }

    /// Resolve the server TLS identity
    ///
    /// Certificate paths from the environment win. Without them, production
    /// and staging refuse to start, development generates a throwaway bundle
    /// into `GRPC_DEV_CERT_DIR` when set and otherwise runs in plaintext.
    pub fn server_tls(&self) -> Result<Option<GrpcServerTlsConfig>> {
        if let Some(config) =
            GrpcServerTlsConfig::from_env().context("Failed to load TLS configuration")?
        {
            return Ok(Some(config));
        }

        if self.tls_required() {
            bail!(
                "TLS is required in production/staging but GRPC_SERVER_CERT_PATH/GRPC_SERVER_KEY_PATH are not set"
            );
        }

        match &self.dev_cert_dir {
            Some(dir) => {
                let config = GrpcServerTlsConfig::development(dir)
                    .context("Failed to generate development certificates")?;
                info!(ca_cert = %dir.join("ca.crt").display(), "Development TLS enabled");
                Ok(Some(config))
            }
            None => {
                warn!("TLS configuration missing - starting without TLS (development only)");
                Ok(None)
            }
        }
    }
}

/// gRPC listener settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("SERVER_PORT", 50051)?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("Invalid server address")
    }
}

/// Token verification settings
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: SecretKey,
    pub issuer: ClaimConstraint,
    pub audience: ClaimConstraint,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            secret: required_secret()?,
            issuer: ClaimConstraint::from_config(env::var("JWT_ISSUER").ok().as_deref()),
            audience: ClaimConstraint::from_config(env::var("JWT_AUDIENCE").ok().as_deref()),
        })
    }

    pub fn constraints(&self) -> ValidationConstraints {
        ValidationConstraints::new(self.issuer.clone(), self.audience.clone())
    }
}

/// Call handling settings
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub worker_pool_size: usize,
    pub stream_pacing: Duration,
}

impl DispatchSettings {
    fn from_env() -> Result<Self> {
        let worker_pool_size = parse_var("WORKER_POOL_SIZE", DEFAULT_WORKER_POOL_SIZE)?;
        if worker_pool_size == 0 {
            bail!("WORKER_POOL_SIZE must be at least 1");
        }

        let pacing_ms = parse_var("STREAM_PACING_MS", DEFAULT_STREAM_PACING.as_millis() as u64)?;

        Ok(Self {
            worker_pool_size,
            stream_pacing: Duration::from_millis(pacing_ms),
        })
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            stream_pacing: DEFAULT_STREAM_PACING,
        }
    }
}

/// Settings for the `greeter-client` demo binary
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub endpoint: String,
    pub secret: SecretKey,
    pub subject: String,
    pub token_ttl: chrono::Duration,
}

impl ClientSettings {
    pub fn load() -> Result<Self> {
        load_dotenv();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let ttl_secs: i64 = parse_var("JWT_TTL_SECONDS", 3600)?;
        let token_ttl = chrono::Duration::try_seconds(ttl_secs)
            .with_context(|| format!("JWT_TTL_SECONDS out of range: {}", ttl_secs))?;

        Ok(Self {
            endpoint: env::var("GREETER_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:50051".to_string()),
            secret: required_secret()?,
            subject: env::var("GREETER_SUBJECT").unwrap_or_else(|_| "test-user".to_string()),
            token_ttl,
        })
    }
}
