//! Transport-agnostic greeting logic for the four call shapes
//!
//! Streaming calls are driven over an explicit channel pair: an inbound
//! `Stream` of requests and an outbound `mpsc::Sender` of replies. The tonic
//! adapter in [`crate::grpc`] only wires those up; everything observable about
//! a call (messages, ordering, termination) is decided here.

use std::future::Future;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tonic::Status;
use tracing::debug;

use crate::error::{GreeterError, Result};
use crate::grpc::greeter::v1::{HelloReply, HelloRequest};
use crate::session::StreamSession;

/// Replies produced by one server-streaming call
pub const SERVER_STREAM_REPLIES: u32 = 5;

pub const DEFAULT_STREAM_PACING: Duration = Duration::from_millis(1000);

/// Name rejected as a business validation failure
pub const RESERVED_NAME: &str = "error";

/// Name that triggers an unexpected internal fault
pub const FAULT_NAME: &str = "internal";

pub type ReplySink = mpsc::Sender<std::result::Result<HelloReply, Status>>;

#[derive(Debug, Clone)]
pub struct GreeterDispatcher {
    pacing: Duration,
}

impl Default for GreeterDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_PACING)
    }
}

fn greeting(name: &str) -> HelloReply {
    HelloReply {
        message: format!("Hello, {name}!"),
    }
}

impl GreeterDispatcher {
    pub fn new(pacing: Duration) -> Self {
        Self { pacing }
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    pub fn say_hello(&self, request: HelloRequest) -> HelloReply {
        greeting(&request.name)
    }

    pub fn say_hello_with_error(&self, request: HelloRequest) -> Result<HelloReply> {
        match request.name.as_str() {
            RESERVED_NAME => Err(GreeterError::Validation(
                "Name cannot be 'error'".to_string(),
            )),
            FAULT_NAME => Err(GreeterError::Internal(
                "simulated fault while greeting 'internal'".to_string(),
            )),
            name => Ok(greeting(name)),
        }
    }

    /// Push [`SERVER_STREAM_REPLIES`] paced replies into `sink`
    pub async fn server_stream(
        &self,
        request: HelloRequest,
        session: &mut StreamSession,
        sink: &ReplySink,
        deadline: Option<Instant>,
    ) -> Result<()> {
        let outcome = with_deadline(deadline, self.produce_replies(request, session, sink)).await;
        settle(session, outcome)
    }

    /// Drain `inbound` and greet every name in arrival order
    pub async fn client_stream<S>(
        &self,
        inbound: S,
        session: &mut StreamSession,
        deadline: Option<Instant>,
    ) -> Result<HelloReply>
    where
        S: Stream<Item = std::result::Result<HelloRequest, Status>> + Unpin + Send,
    {
        let outcome = with_deadline(deadline, self.collect_names(inbound, session)).await;
        settle(session, outcome)
    }

    /// Answer each inbound request with one reply before reading the next
    pub async fn bidirectional<S>(
        &self,
        inbound: S,
        session: &mut StreamSession,
        sink: &ReplySink,
        deadline: Option<Instant>,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<HelloRequest, Status>> + Unpin + Send,
    {
        let outcome = with_deadline(deadline, self.echo_greetings(inbound, session, sink)).await;
        settle(session, outcome)
    }

    async fn produce_replies(
        &self,
        request: HelloRequest,
        session: &mut StreamSession,
        sink: &ReplySink,
    ) -> Result<()> {
        session.begin()?;

        for ordinal in 1..=SERVER_STREAM_REPLIES {
            if ordinal > 1 {
                tokio::select! {
                    _ = tokio::time::sleep(self.pacing) => {},
                    _ = sink.closed() => return Err(peer_gone()),
                }
            }

            let reply = HelloReply {
                message: format!("Hello, {}! Response #{}", request.name, ordinal),
            };
            sink.send(Ok(reply)).await.map_err(|_| peer_gone())?;
            session.record_sent()?;
        }

        session.complete()?;
        Ok(())
    }

    async fn collect_names<S>(&self, mut inbound: S, session: &mut StreamSession) -> Result<HelloReply>
    where
        S: Stream<Item = std::result::Result<HelloRequest, Status>> + Unpin + Send,
    {
        session.begin()?;

        let mut names = Vec::new();
        while let Some(item) = inbound.next().await {
            let request = item.map_err(inbound_failed)?;
            session.record_received()?;
            names.push(request.name);
        }

        let reply = HelloReply {
            message: format!("Hello to all: {}!", names.join(", ")),
        };
        session.record_sent()?;
        session.complete()?;
        Ok(reply)
    }

    async fn echo_greetings<S>(
        &self,
        mut inbound: S,
        session: &mut StreamSession,
        sink: &ReplySink,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<HelloRequest, Status>> + Unpin + Send,
    {
        session.begin()?;

        loop {
            let item = tokio::select! {
                item = inbound.next() => item,
                _ = sink.closed() => return Err(peer_gone()),
            };
            let Some(item) = item else { break };

            let request = item.map_err(inbound_failed)?;
            session.record_received()?;

            sink.send(Ok(greeting(&request.name)))
                .await
                .map_err(|_| peer_gone())?;
            session.record_sent()?;
        }

        session.complete()?;
        Ok(())
    }
}

/// Bound `work` by the caller's deadline, if one was supplied
pub async fn with_deadline<F, T>(deadline: Option<Instant>, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, work)
            .await
            .map_err(|_| GreeterError::DeadlineExceeded)?,
        None => work.await,
    }
}

/// Abort the session on any failure so it ends in a terminal state
fn settle<T>(session: &mut StreamSession, outcome: Result<T>) -> Result<T> {
    if let Err(err) = &outcome {
        debug!(
            call_id = %session.call_id(),
            shape = %session.shape(),
            error = %err,
            "Aborting stream session"
        );
        session.abort(err.to_string())?;
    }
    outcome
}

fn peer_gone() -> GreeterError {
    GreeterError::Aborted("peer disconnected".to_string())
}

fn inbound_failed(status: Status) -> GreeterError {
    GreeterError::Aborted(format!("inbound stream failed: {}", status.message()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use grpc_jwt_auth::CallShape;
    use tokio_stream::wrappers::ReceiverStream;
    use uuid::Uuid;

    fn request(name: &str) -> HelloRequest {
        HelloRequest {
            name: name.to_string(),
        }
    }

    fn inbound(names: &[&str]) -> impl Stream<Item = std::result::Result<HelloRequest, Status>> + Unpin + Send {
        let items: Vec<_> = names.iter().map(|name| Ok(request(name))).collect();
        tokio_stream::iter(items)
    }

    fn session(shape: CallShape) -> StreamSession {
        StreamSession::new(Uuid::new_v4(), shape)
    }

    async fn drain(mut rx: mpsc::Receiver<std::result::Result<HelloReply, Status>>) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(item) = rx.recv().await {
            messages.push(item.unwrap().message);
        }
        messages
    }

    #[test]
    fn test_unary_greeting() {
        let reply = GreeterDispatcher::default().say_hello(request("Alice"));
        assert_eq!(reply.message, "Hello, Alice!");
    }

    #[test]
    fn test_error_demo_validation() {
        let err = GreeterDispatcher::default()
            .say_hello_with_error(request("error"))
            .unwrap_err();
        let status = err.to_status();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(status.message(), "Name cannot be 'error'");
    }

    #[test]
    fn test_error_demo_internal() {
        let err = GreeterDispatcher::default()
            .say_hello_with_error(request("internal"))
            .unwrap_err();
        assert_eq!(err.to_status().code(), tonic::Code::Internal);
    }

    #[test]
    fn test_error_demo_otherwise_unary() {
        let reply = GreeterDispatcher::default()
            .say_hello_with_error(request("Zoe"))
            .unwrap();
        assert_eq!(reply.message, "Hello, Zoe!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_stream_emits_five_in_order() {
        let dispatcher = GreeterDispatcher::default();
        let (tx, rx) = mpsc::channel(8);
        let mut session = session(CallShape::ServerStreaming);

        let started = Instant::now();
        dispatcher
            .server_stream(request("Bob"), &mut session, &tx, None)
            .await
            .unwrap();
        drop(tx);

        let expected: Vec<_> = (1..=5).map(|i| format!("Hello, Bob! Response #{i}")).collect();
        assert_eq!(drain(rx).await, expected);
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.sent(), 5);
        // four gaps between five replies
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_server_stream_without_pacing() {
        let dispatcher = GreeterDispatcher::new(Duration::ZERO);
        let (tx, rx) = mpsc::channel(8);
        let mut session = session(CallShape::ServerStreaming);

        dispatcher
            .server_stream(request("Bob"), &mut session, &tx, None)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(drain(rx).await.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_stream_aborts_when_peer_leaves() {
        let dispatcher = GreeterDispatcher::default();
        let (tx, mut rx) = mpsc::channel(8);
        let mut session = session(CallShape::ServerStreaming);

        let consumer = tokio::spawn(async move {
            let first = rx.recv().await;
            drop(rx);
            first
        });

        let err = dispatcher
            .server_stream(request("Bob"), &mut session, &tx, None)
            .await
            .unwrap_err();

        assert!(matches!(err, GreeterError::Aborted(_)));
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(session.sent(), 1);
        assert!(consumer.await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_stream_respects_deadline() {
        let dispatcher = GreeterDispatcher::default();
        let (tx, rx) = mpsc::channel(8);
        let mut session = session(CallShape::ServerStreaming);

        let deadline = Instant::now() + Duration::from_millis(2500);
        let err = dispatcher
            .server_stream(request("Bob"), &mut session, &tx, Some(deadline))
            .await
            .unwrap_err();
        drop(tx);

        assert!(matches!(err, GreeterError::DeadlineExceeded));
        assert_eq!(session.state(), SessionState::Aborted);
        // replies at t=0s, 1s, 2s
        assert_eq!(drain(rx).await.len(), 3);
    }

    #[tokio::test]
    async fn test_client_stream_joins_in_order() {
        let dispatcher = GreeterDispatcher::default();
        let mut session = session(CallShape::ClientStreaming);

        let reply = dispatcher
            .client_stream(inbound(&["Charlie", "David", "Eve"]), &mut session, None)
            .await
            .unwrap();

        assert_eq!(reply.message, "Hello to all: Charlie, David, Eve!");
        assert_eq!(session.received(), 3);
        assert_eq!(session.sent(), 1);
        assert_eq!(session.state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_client_stream_empty() {
        let dispatcher = GreeterDispatcher::default();
        let mut session = session(CallShape::ClientStreaming);

        let reply = dispatcher
            .client_stream(inbound(&[]), &mut session, None)
            .await
            .unwrap();

        assert_eq!(reply.message, "Hello to all: !");
    }

    #[tokio::test]
    async fn test_client_stream_transport_error_aborts() {
        let dispatcher = GreeterDispatcher::default();
        let mut session = session(CallShape::ClientStreaming);
        let items = vec![Ok(request("Charlie")), Err(Status::unavailable("connection reset"))];

        let err = dispatcher
            .client_stream(tokio_stream::iter(items), &mut session, None)
            .await
            .unwrap_err();

        assert!(matches!(err, GreeterError::Aborted(_)));
        assert!(!err.is_reportable());
        assert_eq!(session.state(), SessionState::Aborted);
    }

    #[tokio::test]
    async fn test_bidirectional_one_reply_per_request() {
        let dispatcher = GreeterDispatcher::default();
        let (tx, rx) = mpsc::channel(8);
        let mut session = session(CallShape::Bidirectional);

        dispatcher
            .bidirectional(inbound(&["Frank", "Grace", "Heidi"]), &mut session, &tx, None)
            .await
            .unwrap();
        drop(tx);

        assert_eq!(
            drain(rx).await,
            vec!["Hello, Frank!", "Hello, Grace!", "Hello, Heidi!"]
        );
        assert_eq!((session.received(), session.sent()), (3, 3));
        assert_eq!(session.state(), SessionState::Completed);
    }

    #[tokio::test]
    async fn test_bidirectional_interleaves() {
        let dispatcher = GreeterDispatcher::default();
        let (in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, mut out_rx) = mpsc::channel(1);

        let exchange = tokio::spawn(async move {
            let mut session = session(CallShape::Bidirectional);
            dispatcher
                .bidirectional(ReceiverStream::new(in_rx), &mut session, &out_tx, None)
                .await
                .map(|_| session.sent())
        });

        for name in ["Frank", "Grace"] {
            in_tx.send(Ok(request(name))).await.unwrap();
            let reply = out_rx.recv().await.unwrap().unwrap();
            assert_eq!(reply.message, format!("Hello, {name}!"));
        }
        drop(in_tx);

        assert_eq!(exchange.await.unwrap().unwrap(), 2);
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_bidirectional_peer_gone_while_waiting() {
        let dispatcher = GreeterDispatcher::default();
        let (_in_tx, in_rx) = mpsc::channel::<std::result::Result<HelloRequest, Status>>(1);
        let (out_tx, out_rx) = mpsc::channel(1);
        drop(out_rx);

        let mut session = session(CallShape::Bidirectional);
        let err = dispatcher
            .bidirectional(ReceiverStream::new(in_rx), &mut session, &out_tx, None)
            .await
            .unwrap_err();

        assert!(matches!(err, GreeterError::Aborted(_)));
        assert_eq!(session.state(), SessionState::Aborted);
    }
}
