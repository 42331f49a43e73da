//! Client-side bearer token injection
//!
//! Adds `authorization: Bearer <token>` to every outgoing gRPC call.

use thiserror::Error;
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

#[derive(Debug, Error)]
pub enum BearerError {
    #[error("token is empty")]
    EmptyToken,

    #[error("token is not a valid ASCII metadata value")]
    InvalidToken(#[from] tonic::metadata::errors::InvalidMetadataValue),
}

/// Client-side interceptor that attaches a bearer token to each call
///
/// The header value is parsed once at construction; cloning is cheap.
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_jwt_auth::BearerInterceptor;
/// use tonic::transport::Channel;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let interceptor = BearerInterceptor::new("eyJhbGc...")?;
///
/// let channel = Channel::from_static("http://[::1]:50051")
///     .connect()
///     .await?;
///
/// // let mut client = GreeterClient::with_interceptor(channel, interceptor);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BearerInterceptor {
    /// Pre-formatted "Bearer {token}"
    auth_header: AsciiMetadataValue,
}

impl BearerInterceptor {
    pub fn new(token: impl AsRef<str>) -> Result<Self, BearerError> {
        let token = token.as_ref();
        if token.is_empty() {
            return Err(BearerError::EmptyToken);
        }

        let auth_header = AsciiMetadataValue::try_from(format!("Bearer {token}"))?;
        Ok(Self { auth_header })
    }

    /// Use an already formatted header value as-is
    pub fn from_header(auth_header: AsciiMetadataValue) -> Self {
        Self { auth_header }
    }
}

impl Interceptor for BearerInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert("authorization", self.auth_header.clone());

        Ok(request)
    }
}
