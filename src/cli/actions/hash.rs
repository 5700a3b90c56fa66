use crate::credentials::hasher;
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug)]
pub struct Args {
    pub api_key: SecretString,
    pub cost: u32,
}

/// Print the bcrypt hash of the API key on stdout.
/// # Errors
/// Returns an error if hashing fails.
pub async fn execute(args: Args) -> Result<()> {
    let hashed = hash(args).await?;
    println!("{hashed}");
    Ok(())
}

async fn hash(args: Args) -> Result<String> {
    tokio::task::spawn_blocking(move || hasher::hash(args.api_key.expose_secret(), args.cost))
        .await
        .context("hashing task failed")?
}
