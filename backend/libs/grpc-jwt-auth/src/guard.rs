//! Ordered call-guard pipeline
//!
//! A guard either lets the call through (possibly after annotating it) or
//! ends it with a terminal `Status`. The chain runs guards in order and stops
//! at the first rejection.

use std::sync::Arc;

use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::info;

use crate::context::CallContext;

/// One stage of call admission
///
/// Guards see call-establishment metadata only. They run exactly once per
/// call, before any stream message is read or written.
pub trait CallGuard: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn check(&self, request: &mut Request<()>) -> Result<(), Status>;
}

/// Cloneable, ordered list of guards usable as a tonic interceptor
///
/// ```rust
/// use crypto_core::{SecretKey, ValidationConstraints};
/// use grpc_jwt_auth::{AuthGate, GuardChain, LoggingProbe};
///
/// let gate = AuthGate::new(SecretKey::from("secret"), ValidationConstraints::default());
/// let chain = GuardChain::new().with_guard(gate).with_guard(LoggingProbe);
/// assert_eq!(chain.names(), vec!["auth_gate", "logging_probe"]);
/// ```
#[derive(Clone, Default)]
pub struct GuardChain {
    guards: Arc<Vec<Arc<dyn CallGuard>>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a guard to the end of the chain
    pub fn with_guard(mut self, guard: impl CallGuard) -> Self {
        Arc::make_mut(&mut self.guards).push(Arc::new(guard));
        self
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|guard| guard.name()).collect()
    }

    /// Run every guard in order; the first rejection wins
    pub fn admit(&self, mut request: Request<()>) -> Result<Request<()>, Status> {
        for guard in self.guards.iter() {
            guard.check(&mut request)?;
        }
        Ok(request)
    }
}

impl Interceptor for GuardChain {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.admit(request)
    }
}

/// Pass-through guard that records each admitted call
///
/// Placed after the auth gate it sees the call id and subject; placed before
/// it, only that a call arrived.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProbe;

impl CallGuard for LoggingProbe {
    fn name(&self) -> &'static str {
        "logging_probe"
    }

    fn check(&self, request: &mut Request<()>) -> Result<(), Status> {
        match request.extensions().get::<CallContext>() {
            Some(context) => info!(
                call_id = %context.call_id(),
                subject = context.identity().unwrap_or_default(),
                "Call admitted"
            ),
            None => info!("Call received"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        hits: Arc<AtomicUsize>,
    }

    impl CallGuard for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn check(&self, _request: &mut Request<()>) -> Result<(), Status> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Deny;

    impl CallGuard for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        fn check(&self, _request: &mut Request<()>) -> Result<(), Status> {
            Err(Status::permission_denied("denied"))
        }
    }

    #[test]
    fn test_empty_chain_admits() {
        let chain = GuardChain::new();
        assert!(chain.is_empty());
        assert!(chain.admit(Request::new(())).is_ok());
    }

    #[test]
    fn test_rejection_short_circuits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = GuardChain::new()
            .with_guard(Counting { hits: hits.clone() })
            .with_guard(Deny)
            .with_guard(Counting { hits: hits.clone() });

        let status = chain.admit(Request::new(())).unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_guards() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = GuardChain::new().with_guard(Counting { hits: hits.clone() });
        let mut cloned = chain.clone();

        cloned.call(Request::new(())).unwrap();
        chain.admit(Request::new(())).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(cloned.len(), 1);
    }

    #[test]
    fn test_extending_a_clone_leaves_original_alone() {
        let base = GuardChain::new().with_guard(LoggingProbe);
        let extended = base.clone().with_guard(Deny);

        assert_eq!(base.names(), vec!["logging_probe"]);
        assert_eq!(extended.names(), vec!["logging_probe", "deny"]);
    }

    #[test]
    fn test_logging_probe_passes_through() {
        let mut request = Request::new(());
        assert!(LoggingProbe.check(&mut request).is_ok());
    }
}
