//! Request extension trait for reaching the call context from handlers

use tonic::{Request, Status};
use tracing::error;

use crate::context::CallContext;
use crate::server::unauthenticated;

/// Access to the [`CallContext`] stored by the auth gate
///
/// A missing context means the gate was not attached to the service. The
/// caller sees the same `Unauthenticated` status as any other rejection.
///
/// ```rust,no_run
/// use grpc_jwt_auth::CallContextExt;
/// use tonic::{Request, Response, Status};
///
/// async fn handler(request: Request<()>) -> Result<Response<()>, Status> {
///     let subject = request.authenticated_subject()?;
///     tracing::info!(subject, "handling call");
///     Ok(Response::new(()))
/// }
/// ```
pub trait CallContextExt {
    fn call_context(&self) -> Result<&CallContext, Status>;

    /// Remove the context so the handler can own it for the rest of the call
    fn take_call_context(&mut self) -> Result<CallContext, Status>;

    fn authenticated_subject(&self) -> Result<&str, Status>;
}

impl<T> CallContextExt for Request<T> {
    fn call_context(&self) -> Result<&CallContext, Status> {
        self.extensions().get::<CallContext>().ok_or_else(missing_context)
    }

    fn take_call_context(&mut self) -> Result<CallContext, Status> {
        self.extensions_mut()
            .remove::<CallContext>()
            .ok_or_else(missing_context)
    }

    fn authenticated_subject(&self) -> Result<&str, Status> {
        self.call_context()?.identity().ok_or_else(missing_context)
    }
}

fn missing_context() -> Status {
    error!("No call context on request. Ensure AuthGate is attached to the service.");
    unauthenticated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataMap;

    fn accepted(subject: &str) -> CallContext {
        let mut context = CallContext::pending(&MetadataMap::new());
        context.accept(subject).unwrap();
        context
    }

    #[test]
    fn test_missing_context_is_unauthenticated() {
        let request = Request::new(());
        let status = request.call_context().unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_authenticated_subject() {
        let mut request = Request::new(());
        request.extensions_mut().insert(accepted("alice"));
        assert_eq!(request.authenticated_subject().unwrap(), "alice");
    }

    #[test]
    fn test_pending_context_has_no_subject() {
        let mut request = Request::new(());
        request
            .extensions_mut()
            .insert(CallContext::pending(&MetadataMap::new()));
        assert!(request.authenticated_subject().is_err());
    }

    #[test]
    fn test_take_call_context() {
        let mut request = Request::new(());
        request.extensions_mut().insert(accepted("alice"));

        let context = request.take_call_context().unwrap();
        assert_eq!(context.identity(), Some("alice"));
        assert!(request.call_context().is_err());
    }
}
