//! Example walking through the OAuth2 authorization-code flow.
//!
//! This example shows how to:
//! - Build the authorization URL the user opens in a browser
//! - Feed the observed redirect back into the credential
//! - Send requests that refresh the access token when it nears expiry
//!
//! Run with:
//! `HARVEST_CLIENT_ID=... HARVEST_CLIENT_SECRET=... cargo run --example oauth_flow`
//! then paste the URL the browser was redirected to.

use harvest_engine::{
    AuthorizationCodeCredential, HarvestTokenEndpoint, NoConfiguration, RequestAdapter,
    RequestBuilder,
};
use serde::Deserialize;
use std::io::BufRead;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const REDIRECT_URI: &str = "http://localhost:8080/callback";

#[derive(Debug, Deserialize)]
struct Account {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Accounts {
    accounts: Vec<Account>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Me {
    id: u64,
    first_name: String,
    last_name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("harvest_engine=info,oauth_flow=info")
        .init();

    let credential = Arc::new(AuthorizationCodeCredential::new(
        std::env::var("HARVEST_CLIENT_ID")?,
        std::env::var("HARVEST_CLIENT_SECRET")?,
        REDIRECT_URI,
        Arc::new(HarvestTokenEndpoint::new()?),
    )?);
    let cancel = CancellationToken::new();

    println!("=== Step 1: Authorize ===");
    println!("Open this URL in a browser:\n  {}", credential.authorization_url()?);
    println!("Then paste the URL you were redirected to:");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match credential.handle_redirect(line.trim(), &cancel).await {
            Ok(true) => break,
            Ok(false) => println!("That is not {}..., try again:", REDIRECT_URI),
            Err(e) => {
                println!("Authorization failed: {}", e);
                return Err(e.into());
            }
        }
    }
    println!();

    println!("=== Step 2: Discover accounts ===");
    let accounts_adapter = RequestAdapter::builder()
        .base_url("https://id.getharvest.com/api/v2")?
        .credential(credential.clone())
        .build()?;
    let request = RequestBuilder::new("{+baseurl}/accounts")
        .for_get::<(), NoConfiguration>(None)?;
    let accounts = accounts_adapter.send::<Accounts>(request, &cancel).await?;
    let Some(account) = accounts.data.accounts.first() else {
        println!("No Harvest accounts are available to this user");
        return Ok(());
    };
    println!("Using account {} ({})", account.name, account.id);
    println!();

    println!("=== Step 3: Call the API ===");
    let adapter = RequestAdapter::builder()
        .credential(credential.clone())
        .account_id(account.id.to_string())
        .build()?;
    let request = RequestBuilder::new("{+baseurl}/users/me")
        .for_get::<(), NoConfiguration>(None)?;
    let me = adapter.send::<Me>(request, &cancel).await?;
    println!("Signed in as {} {}", me.first_name, me.last_name);

    if let Some(token) = credential.access_token().await {
        println!("Token expires at {}", token.expires_at());
    }

    Ok(())
}
