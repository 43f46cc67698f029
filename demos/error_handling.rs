//! Example demonstrating error handling.
//!
//! This example shows how to:
//! - Catch configuration errors before anything is sent
//! - Inspect HTTP status codes and raw bodies
//! - Deal with deserialization failures
//! - Tell authentication errors apart from the rest
//!
//! Run with: `HARVEST_ACCESS_TOKEN=... HARVEST_ACCOUNT_ID=... cargo run --example error_handling`

use harvest_engine::{Error, NoConfiguration, RequestAdapter, RequestBuilder, StaticTokenCredential};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Project {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("harvest_engine=info")
        .init();

    let adapter = RequestAdapter::builder()
        .credential(StaticTokenCredential::new(std::env::var("HARVEST_ACCESS_TOKEN")?)?)
        .account_id(std::env::var("HARVEST_ACCOUNT_ID")?)
        .build()?;
    let cancel = CancellationToken::new();

    println!("=== Example 1: Configuration Errors ===");
    // A POST without a body is rejected while building the request
    match RequestBuilder::new("{+baseurl}/projects")
        .for_post::<serde_json::Value, (), NoConfiguration>(None, None)
    {
        Err(e @ Error::MissingBody) => {
            println!("Rejected: {}", e);
            println!("  Is configuration error: {}", e.is_configuration());
        }
        other => println!("Unexpected: {:?}", other.map(|r| r.method)),
    }
    println!();

    println!("=== Example 2: Handling HTTP Errors ===");
    let request = RequestBuilder::new("{+baseurl}/projects/{project_id}")
        .with_path_parameter("project_id", 0u64)
        .for_get::<(), NoConfiguration>(None)?;
    match adapter.send::<Project>(request, &cancel).await {
        Ok(response) => println!("Success: {:?}", response.data),
        Err(Error::HttpError {
            status,
            raw_response,
            headers,
        }) => {
            println!("HTTP Error!");
            println!("  Status: {}", status);
            println!("  Is client error (4xx): {}", status.is_client_error());
            println!("  Raw response: {}", raw_response);
            println!("  Content-Type: {:?}", headers.get("content-type"));
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 3: Handling Deserialization Errors ===");
    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct WrongSchema {
        nonexistent_field: String,
    }

    let request = RequestBuilder::new("{+baseurl}/company")
        .for_get::<(), NoConfiguration>(None)?;
    match adapter.send::<WrongSchema>(request, &cancel).await {
        Ok(_) => println!("Unexpected success"),
        Err(Error::DeserializationFailed {
            raw_response,
            serde_error,
            status,
        }) => {
            println!("Deserialization Failed!");
            println!("  Status: {}", status);
            println!("  Serde error: {}", serde_error);
            println!(
                "  Raw response (first 200 chars): {}",
                raw_response.chars().take(200).collect::<String>()
            );
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 4: Authentication Errors ===");
    let bad_adapter = RequestAdapter::builder()
        .credential(StaticTokenCredential::new("not-a-real-token")?)
        .build()?;
    let request = RequestBuilder::new("{+baseurl}/users/me")
        .for_get::<(), NoConfiguration>(None)?;
    match bad_adapter.send::<serde_json::Value>(request, &cancel).await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => {
            println!("Request failed: {}", e);
            println!("  Status: {:?}", e.status());
            println!("  Is authentication error: {}", e.is_authentication());
        }
    }

    Ok(())
}
