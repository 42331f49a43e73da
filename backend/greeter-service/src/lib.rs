/// Greeter Service Library
///
/// A gRPC greeter serving the four call shapes behind bearer token
/// authentication.
///
/// ## Modules
///
/// - `config`: Service and demo client configuration
/// - `dispatcher`: Greeting logic over an explicit channel pair
/// - `error`: Error types and their mapping to gRPC status
/// - `grpc`: tonic adapter and generated protobuf types
/// - `session`: Streaming call state machine
/// - `worker_pool`: Bounded admission of in-flight calls
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod grpc;
pub mod session;
pub mod worker_pool;

// Re-export commonly used types
pub use dispatcher::GreeterDispatcher;
pub use error::{GreeterError, Result};
pub use grpc::GreeterService;
pub use session::{SessionError, SessionState, StreamSession};
pub use worker_pool::{WorkerPool, WorkerSlot};
