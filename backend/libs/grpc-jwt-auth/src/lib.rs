//! Bearer token authentication for the greeter gRPC surface
//!
//! Every inbound call passes an ordered chain of [`CallGuard`]s before any
//! handler runs. The [`AuthGate`] guard verifies the `authorization: Bearer`
//! token and leaves a [`CallContext`] carrying the verified subject in the
//! request extensions.
//!
//! ## Core Components
//!
//! - **AuthGate**: verifies the bearer token, rejects with one uniform status
//! - **GuardChain**: ordered guards usable as a tonic `Interceptor`
//! - **LoggingProbe**: pass-through guard that logs admitted calls
//! - **CallContext**: call id, subject, shape, status and deadline of one call
//! - **CallContextExt**: handler-side access to the context
//! - **BearerInterceptor**: client-side header injection
//!
//! ## Server Side
//!
//! ```rust,no_run
//! use crypto_core::{SecretKey, ValidationConstraints};
//! use grpc_jwt_auth::{AuthGate, CallContextExt, GuardChain, LoggingProbe};
//! use tonic::{Request, Response, Status};
//!
//! let chain = GuardChain::new()
//!     .with_guard(AuthGate::new(SecretKey::from("shared"), ValidationConstraints::default()))
//!     .with_guard(LoggingProbe);
//! // let service = GreeterServer::with_interceptor(svc, chain);
//!
//! async fn say_hello(request: Request<()>) -> Result<Response<()>, Status> {
//!     let subject = request.authenticated_subject()?;
//!     tracing::info!(subject, "hello");
//!     Ok(Response::new(()))
//! }
//! ```
//!
//! ## Security Guarantees
//!
//! - HS256 only, expiry checked with a 30 second leeway
//! - No token, wrong scheme, bad signature, expired: all `Unauthenticated`
//!   with the message "Invalid or expired token"
//! - The raw credential is removed from metadata once accepted

mod client;
mod context;
mod extensions;
mod guard;
mod server;

pub use client::{BearerError, BearerInterceptor};
pub use context::{parse_grpc_timeout, CallContext, CallShape, CallStatus, StatusTransitionError};
pub use extensions::CallContextExt;
pub use guard::{CallGuard, GuardChain, LoggingProbe};
pub use server::{unauthenticated, AuthGate, Rejection, UNAUTHENTICATED_MESSAGE};

// Re-export tonic Status for convenience
pub use tonic::Status;
