/// gRPC server implementation for greeter-service
///
/// Implements all RPCs from greeter_service.proto:
/// - Unary: SayHello, SayHelloWithError
/// - Server streaming: SayHelloStream
/// - Client streaming: SayHelloClientStream
/// - Bidirectional: SayHelloBidirectional
///
/// Every call reaches this adapter only after the guard chain accepted it.
/// The adapter takes the call context, holds a worker slot for the whole
/// call and hands the messages to the dispatcher.
use crate::dispatcher::GreeterDispatcher;
use crate::error::GreeterError;
use crate::session::StreamSession;
use crate::worker_pool::WorkerPool;
use crypto_core::{SecretKey, ValidationConstraints};
use grpc_jwt_auth::{AuthGate, CallContext, CallContextExt, CallShape, GuardChain, LoggingProbe};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codegen::InterceptedService;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

// Import generated protobuf types
pub mod greeter {
    pub mod v1 {
        tonic::include_proto!("greeter.v1");
    }
}

use greeter::v1::greeter_server::{Greeter, GreeterServer};
use greeter::v1::{HelloReply, HelloRequest};

/// Replies buffered between the producer task and the transport
const STREAM_BUFFER: usize = 16;

pub type ReplyStream = ReceiverStream<Result<HelloReply, Status>>;

pub type InterceptedGreeter = InterceptedService<GreeterServer<GreeterService>, GuardChain>;

/// Guards every greeter call runs through: authentication, then the probe
pub fn default_guards(secret: SecretKey, constraints: ValidationConstraints) -> GuardChain {
    GuardChain::new()
        .with_guard(AuthGate::new(secret, constraints))
        .with_guard(LoggingProbe)
}

/// Greeter gRPC server
#[derive(Clone)]
pub struct GreeterService {
    dispatcher: GreeterDispatcher,
    pool: WorkerPool,
}

impl GreeterService {
    pub fn new(dispatcher: GreeterDispatcher, pool: WorkerPool) -> Self {
        Self { dispatcher, pool }
    }

    /// Wrap the service so `guards` run before every call
    pub fn into_server(self, guards: GuardChain) -> InterceptedGreeter {
        GreeterServer::with_interceptor(self, guards)
    }
}

fn bind_call<T>(
    request: &mut Request<T>,
    shape: CallShape,
    method: &'static str,
) -> Result<CallContext, Status> {
    let mut context = request.take_call_context()?;
    context.bind(shape, method);
    debug!(call_id = %context.call_id(), method, shape = %shape, "Dispatching call");
    Ok(context)
}

fn deadline_of(context: &CallContext) -> Option<Instant> {
    context.deadline().map(Instant::from_std)
}

fn complete_call(context: &mut CallContext, session: Option<&StreamSession>) {
    if let Err(e) = context.complete() {
        warn!(call_id = %context.call_id(), error = %e, "Call context not completable");
        return;
    }

    info!(
        call_id = %context.call_id(),
        method = context.method().unwrap_or_default(),
        subject = context.identity().unwrap_or_default(),
        received = session.map(StreamSession::received),
        sent = session.map(StreamSession::sent),
        "Call completed"
    );
}

fn fail_call(context: &CallContext, err: GreeterError) -> Status {
    warn!(
        call_id = %context.call_id(),
        method = context.method().unwrap_or_default(),
        error = %err,
        "Call failed"
    );
    err.into()
}

/// Final bookkeeping for a streaming call whose producer runs detached
async fn settle_stream(
    mut context: CallContext,
    session: &StreamSession,
    outcome: Result<(), GreeterError>,
    sink: &mpsc::Sender<Result<HelloReply, Status>>,
) {
    match outcome {
        Ok(()) => complete_call(&mut context, Some(session)),
        Err(err) if err.is_reportable() => {
            let status = fail_call(&context, err);
            // The peer may have left in the meantime; nothing to do then.
            let _ = sink.send(Err(status)).await;
        }
        Err(err) => debug!(
            call_id = %context.call_id(),
            sent = session.sent(),
            reason = %err,
            "Stream aborted, partial output discarded"
        ),
    }
}

#[tonic::async_trait]
impl Greeter for GreeterService {
    async fn say_hello(
        &self,
        mut request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let mut context = bind_call(&mut request, CallShape::Unary, "SayHello")?;
        let _slot = self.pool.acquire().await?;

        let reply = self.dispatcher.say_hello(request.into_inner());
        complete_call(&mut context, None);
        Ok(Response::new(reply))
    }

    type SayHelloStreamStream = ReplyStream;

    async fn say_hello_stream(
        &self,
        mut request: Request<HelloRequest>,
    ) -> Result<Response<Self::SayHelloStreamStream>, Status> {
        let context = bind_call(&mut request, CallShape::ServerStreaming, "SayHelloStream")?;
        let slot = self.pool.acquire().await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let dispatcher = self.dispatcher.clone();
        let deadline = deadline_of(&context);
        let request = request.into_inner();

        tokio::spawn(async move {
            let _slot = slot;
            let mut session = StreamSession::new(context.call_id(), CallShape::ServerStreaming);
            let outcome = dispatcher
                .server_stream(request, &mut session, &tx, deadline)
                .await;
            settle_stream(context, &session, outcome, &tx).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn say_hello_client_stream(
        &self,
        mut request: Request<Streaming<HelloRequest>>,
    ) -> Result<Response<HelloReply>, Status> {
        let mut context = bind_call(
            &mut request,
            CallShape::ClientStreaming,
            "SayHelloClientStream",
        )?;
        let _slot = self.pool.acquire().await?;

        let mut session = StreamSession::new(context.call_id(), CallShape::ClientStreaming);
        let deadline = deadline_of(&context);

        match self
            .dispatcher
            .client_stream(request.into_inner(), &mut session, deadline)
            .await
        {
            Ok(reply) => {
                complete_call(&mut context, Some(&session));
                Ok(Response::new(reply))
            }
            Err(err) => Err(fail_call(&context, err)),
        }
    }

    type SayHelloBidirectionalStream = ReplyStream;

    async fn say_hello_bidirectional(
        &self,
        mut request: Request<Streaming<HelloRequest>>,
    ) -> Result<Response<Self::SayHelloBidirectionalStream>, Status> {
        let context = bind_call(
            &mut request,
            CallShape::Bidirectional,
            "SayHelloBidirectional",
        )?;
        let slot = self.pool.acquire().await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let dispatcher = self.dispatcher.clone();
        let deadline = deadline_of(&context);
        let inbound = request.into_inner();

        tokio::spawn(async move {
            let _slot = slot;
            let mut session = StreamSession::new(context.call_id(), CallShape::Bidirectional);
            let outcome = dispatcher
                .bidirectional(inbound, &mut session, &tx, deadline)
                .await;
            settle_stream(context, &session, outcome, &tx).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn say_hello_with_error(
        &self,
        mut request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let mut context = bind_call(&mut request, CallShape::Unary, "SayHelloWithError")?;
        let _slot = self.pool.acquire().await?;

        match self.dispatcher.say_hello_with_error(request.into_inner()) {
            Ok(reply) => {
                complete_call(&mut context, None);
                Ok(Response::new(reply))
            }
            Err(err) => Err(fail_call(&context, err)),
        }
    }
}
