// Build script for greeter-service
// Compiles greeter_service.proto for gRPC server and client code generation
fn main() {
    println!("cargo:rerun-if-changed=../proto/services/greeter_service.proto");

    // The client is generated for the demo binary and integration tests
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["../proto/services/greeter_service.proto"],
            &["../proto/services"],
        )
        .expect("Failed to compile greeter_service.proto for greeter-service");
}
