/// gRPC server module for greeter-service
///
/// Exports:
/// - GreeterService: tonic adapter over the dispatcher
/// - greeter: Generated protobuf types from greeter_service.proto
pub mod server;

pub use server::greeter;
pub use server::{GreeterService, InterceptedGreeter};
