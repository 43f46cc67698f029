//! Basic example demonstrating GET and POST requests with a personal access token.
//!
//! This example shows how to:
//! - Create an adapter with a static token and account id
//! - Bind typed query parameters to a URL template
//! - Send a JSON body
//! - Access response data and metadata
//!
//! Run with:
//! `HARVEST_ACCESS_TOKEN=... HARVEST_ACCOUNT_ID=... cargo run --example basic_call`

use harvest_engine::{
    NoConfiguration, QueryField, QueryParameters, RequestAdapter, RequestBuilder,
    RequestConfiguration, StaticTokenCredential,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Client {
    id: u64,
    name: String,
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct ClientPage {
    clients: Vec<Client>,
    total_entries: u64,
}

#[derive(Debug, Serialize)]
struct NewClient {
    name: String,
    currency: Option<String>,
}

#[derive(Default)]
struct ClientsQuery {
    is_active: Option<bool>,
    per_page: Option<u32>,
}

impl QueryParameters for ClientsQuery {
    fn query_fields() -> Vec<QueryField<Self>> {
        vec![
            QueryField::new("IsActive", |q: &Self| q.is_active.map(Into::into)).wire_name("is_active"),
            QueryField::new("PerPage", |q: &Self| q.per_page.map(Into::into)).wire_name("per_page"),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("harvest_engine=debug,basic_call=info")
        .init();

    let token = std::env::var("HARVEST_ACCESS_TOKEN")?;
    let account_id = std::env::var("HARVEST_ACCOUNT_ID")?;

    let adapter = RequestAdapter::builder()
        .credential(StaticTokenCredential::new(token)?)
        .account_id(account_id)
        .user_agent("harvest-engine basic_call example")
        .build()?;
    let cancel = CancellationToken::new();

    println!("=== GET Request Example ===");
    let clients = RequestBuilder::new("{+baseurl}/clients{?is_active,per_page}");
    let request = clients.for_get(Some(|config: &mut RequestConfiguration<ClientsQuery>| {
        config.query().is_active = Some(true);
        config.query().per_page = Some(10);
    }))?;

    let response = adapter.send::<ClientPage>(request, &cancel).await?;
    println!("Active clients: {}", response.data.total_entries);
    for client in &response.data.clients {
        println!("  {} - {}", client.id, client.name);
    }
    println!("Request latency: {:?}", response.latency);
    println!("Status code: {}", response.status);
    println!();

    println!("=== POST Request Example ===");
    let new_client = NewClient {
        name: "Example Client".to_string(),
        currency: None,
    };
    let request = clients.for_post::<_, (), NoConfiguration>(Some(&new_client), None)?;
    let response = adapter.send::<Client>(request, &cancel).await?;

    println!("Created client ID: {}", response.data.id);
    println!("Name: {}", response.data.name);
    println!();

    println!("=== Accessing Response Metadata ===");
    println!("Raw response length: {} bytes", response.raw_body.len());
    println!("Content-Type: {:?}", response.header("content-type"));

    Ok(())
}
