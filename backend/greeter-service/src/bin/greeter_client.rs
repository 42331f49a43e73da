//! Demo client for the greeter service
//!
//! Issues a token, checks it locally, then exercises every call shape and the
//! two failure paths (business error, expired token).
//!
//! Run with: cargo run --bin greeter-client

use anyhow::{Context, Result};
use crypto_core::{
    decode_unverified, issue_token, verify_token, ClaimConstraint, SecretKey, ValidationConstraints,
    DEFAULT_AUDIENCE, DEFAULT_ISSUER,
};
use greeter_service::config::{ClientSettings, DEFAULT_LOG_FILTER};
use greeter_service::grpc::greeter::v1::{greeter_client::GreeterClient, HelloRequest};
use grpc_jwt_auth::BearerInterceptor;
use tonic::codegen::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::{error, warn};

type Client = GreeterClient<InterceptedService<Channel, BearerInterceptor>>;

fn hello(name: &str) -> HelloRequest {
    HelloRequest {
        name: name.to_string(),
    }
}

async fn connect(settings: &ClientSettings) -> Result<Channel> {
    let mut endpoint = Endpoint::from_shared(settings.endpoint.clone())
        .with_context(|| format!("Invalid GREETER_ENDPOINT {}", settings.endpoint))?;

    match grpc_tls::GrpcClientTlsConfig::from_env()? {
        Some(tls) => {
            endpoint = endpoint
                .tls_config(tls.build_client_tls()?)
                .context("Failed to configure client TLS")?;
        }
        None => warn!("GRPC_SERVER_CA_CERT_PATH not set - connecting without TLS"),
    }

    endpoint
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", settings.endpoint))
}

fn client_with_token(channel: Channel, token: &str) -> Result<Client> {
    let interceptor = BearerInterceptor::new(token).context("Token is not a valid header value")?;
    Ok(GreeterClient::with_interceptor(channel, interceptor))
}

/// Decode and verify the issued token locally before using it
fn inspect_token(token: &str, secret: &SecretKey) -> Result<()> {
    let claims = decode_unverified(token).context("Issued token is not decodable")?;
    println!(
        "Token claims: sub={} iss={} aud={} iat={} exp={}",
        claims.sub, claims.iss, claims.aud, claims.iat, claims.exp
    );

    let constraints = ValidationConstraints::new(
        ClaimConstraint::Enforced(DEFAULT_ISSUER.to_string()),
        ClaimConstraint::Enforced(DEFAULT_AUDIENCE.to_string()),
    );
    match verify_token(token, secret, &constraints) {
        Ok(_) => println!("Token verifies locally"),
        Err(err) => println!("Token does not verify locally: {} ({})", err, err.reason()),
    }
    Ok(())
}

async fn unary(client: &mut Client) -> Result<()> {
    let reply = client.say_hello(hello("Alice")).await?.into_inner();
    println!("[unary] {}", reply.message);
    Ok(())
}

async fn server_streaming(client: &mut Client) -> Result<()> {
    let mut replies = client.say_hello_stream(hello("Bob")).await?.into_inner();
    while let Some(reply) = replies.message().await? {
        println!("[server stream] {}", reply.message);
    }
    Ok(())
}

async fn client_streaming(client: &mut Client) -> Result<()> {
    let requests = ["Charlie", "David", "Eve"].map(hello);
    let reply = client
        .say_hello_client_stream(tokio_stream::iter(requests))
        .await?
        .into_inner();
    println!("[client stream] {}", reply.message);
    Ok(())
}

async fn bidirectional(client: &mut Client) -> Result<()> {
    let requests = ["Frank", "Grace", "Heidi"].map(hello);
    let mut replies = client
        .say_hello_bidirectional(tokio_stream::iter(requests))
        .await?
        .into_inner();
    while let Some(reply) = replies.message().await? {
        println!("[bidirectional] {}", reply.message);
    }
    Ok(())
}

async fn error_demo(client: &mut Client) -> Result<()> {
    match client.say_hello_with_error(hello("error")).await {
        Ok(reply) => println!("[error demo] unexpected success: {}", reply.into_inner().message),
        Err(status) if status.code() == Code::InvalidArgument => {
            println!("[error demo] rejected as expected: {}", status.message())
        }
        Err(status) => println!(
            "[error demo] unexpected status {:?}: {}",
            status.code(),
            status.message()
        ),
    }
    Ok(())
}

async fn expired_token(channel: Channel, secret: &SecretKey, subject: &str) -> Result<()> {
    let token = issue_token(secret, subject, chrono::Duration::seconds(-1))?;
    let mut client = client_with_token(channel, &token)?;

    match client.say_hello(hello("Expired")).await {
        Ok(reply) => println!("[expired token] unexpected success: {}", reply.into_inner().message),
        Err(status) => println!(
            "[expired token] rejected with {:?}: {}",
            status.code(),
            status.message()
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with_target(false)
        .init();

    let settings = ClientSettings::load().context("Failed to load client configuration")?;

    let token = issue_token(&settings.secret, &settings.subject, settings.token_ttl)
        .context("Failed to issue token")?;
    inspect_token(&token, &settings.secret)?;

    let channel = connect(&settings).await?;
    let mut client = client_with_token(channel.clone(), &token)?;

    if let Err(err) = unary(&mut client).await {
        error!(error = %err, "Unary call failed");
    }
    if let Err(err) = server_streaming(&mut client).await {
        error!(error = %err, "Server streaming call failed");
    }
    if let Err(err) = client_streaming(&mut client).await {
        error!(error = %err, "Client streaming call failed");
    }
    if let Err(err) = bidirectional(&mut client).await {
        error!(error = %err, "Bidirectional call failed");
    }
    if let Err(err) = error_demo(&mut client).await {
        error!(error = %err, "Error demo call failed");
    }
    if let Err(err) = expired_token(channel, &settings.secret, &settings.subject).await {
        error!(error = %err, "Expired token demo failed");
    }

    Ok(())
}
