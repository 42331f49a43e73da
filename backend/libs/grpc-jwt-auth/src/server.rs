//! Server-side bearer token gate
//!
//! Extracts the bearer token from incoming call metadata, verifies it with
//! crypto-core and stores the resulting [`CallContext`] in request extensions.

use std::sync::Arc;

use crypto_core::{decode_unverified, verify_token, SecretKey, ValidationConstraints, VerificationError};
use thiserror::Error;
use tonic::metadata::MetadataMap;
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::{debug, error, info, warn};

use crate::context::CallContext;
use crate::guard::CallGuard;

/// The only message a rejected caller ever sees
pub const UNAUTHENTICATED_MESSAGE: &str = "Invalid or expired token";

const AUTHORIZATION_HEADER: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

/// Internal rejection reason; logged, never returned
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("authorization header is not 'Bearer <token>'")]
    MalformedHeader,

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader => "malformed_header",
            Self::Verification(err) => err.reason(),
        }
    }
}

/// The uniform rejection status
pub fn unauthenticated() -> Status {
    Status::unauthenticated(UNAUTHENTICATED_MESSAGE)
}

/// Verifies the bearer token of every call
///
/// Every failure mode (missing header, wrong scheme, bad signature, expired,
/// claim mismatch) ends the call with the same `Unauthenticated` status. The
/// specific reason goes to the log.
///
/// ## Usage
///
/// ```rust,no_run
/// use crypto_core::{ClaimConstraint, SecretKey, ValidationConstraints};
/// use grpc_jwt_auth::AuthGate;
///
/// let constraints = ValidationConstraints::new(
///     ClaimConstraint::from_config(Some("greeter-service")),
///     ClaimConstraint::Ignored,
/// );
/// let gate = AuthGate::new(SecretKey::from("shared-secret"), constraints);
/// // let service = GreeterServer::with_interceptor(svc, gate);
/// ```
#[derive(Clone)]
pub struct AuthGate {
    secret: Arc<SecretKey>,
    constraints: Arc<ValidationConstraints>,
}

impl AuthGate {
    pub fn new(secret: SecretKey, constraints: ValidationConstraints) -> Self {
        Self {
            secret: Arc::new(secret),
            constraints: Arc::new(constraints),
        }
    }

    pub fn constraints(&self) -> &ValidationConstraints {
        &self.constraints
    }

    /// Extract the token from `authorization: Bearer <token>`
    ///
    /// The scheme tag is case-sensitive and followed by exactly one space.
    pub fn extract_bearer(metadata: &MetadataMap) -> Result<&str, Rejection> {
        let header = metadata
            .get(AUTHORIZATION_HEADER)
            .ok_or(Rejection::MissingHeader)?;

        let value = header.to_str().map_err(|_| Rejection::MalformedHeader)?;

        value
            .strip_prefix(BEARER_PREFIX)
            .ok_or(Rejection::MalformedHeader)
    }

    /// Authenticate call metadata, returning the verified subject
    pub fn authenticate(&self, metadata: &MetadataMap) -> Result<String, Rejection> {
        let token = Self::extract_bearer(metadata)?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            match decode_unverified(token) {
                Ok(claims) => debug!(
                    subject = %claims.sub,
                    iat = claims.iat,
                    exp = claims.exp,
                    iss = %claims.iss,
                    aud = %claims.aud,
                    "Presented token claims (unverified)"
                ),
                Err(e) => debug!(error = %e, "Presented token is not decodable"),
            }
        }

        let claims = verify_token(token, &self.secret, &self.constraints)?;
        Ok(claims.sub)
    }
}

impl CallGuard for AuthGate {
    fn name(&self) -> &'static str {
        "auth_gate"
    }

    fn check(&self, request: &mut Request<()>) -> Result<(), Status> {
        let mut context = CallContext::pending(request.metadata());

        match self.authenticate(request.metadata()) {
            Ok(subject) => {
                if let Err(e) = context.accept(subject) {
                    error!(call_id = %context.call_id(), error = %e, "Call context in unexpected state");
                    return Err(unauthenticated());
                }

                info!(
                    call_id = %context.call_id(),
                    subject = context.identity().unwrap_or_default(),
                    "Call authenticated"
                );

                request.metadata_mut().remove(AUTHORIZATION_HEADER);
                request.extensions_mut().insert(context);
                Ok(())
            }
            Err(rejection) => {
                // A fresh context is always pending, so this cannot fail.
                let _ = context.reject();

                warn!(
                    call_id = %context.call_id(),
                    reason = rejection.reason(),
                    detail = %rejection,
                    "Call rejected"
                );

                Err(unauthenticated())
            }
        }
    }
}

impl Interceptor for AuthGate {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        self.check(&mut request)?;
        Ok(request)
    }
}
