use crate::api::handlers::auth::verifier;
use anyhow::{bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Read one secret from stdin and print its Argon2id PHC string.
/// # Errors
/// Returns an error if stdin cannot be read, is empty, or hashing fails.
pub async fn execute() -> Result<()> {
    let secret = read_secret(BufReader::new(tokio::io::stdin())).await?;

    let hash = tokio::task::spawn_blocking(move || verifier::hash_secret(secret.expose_secret()))
        .await
        .context("Hashing task failed")?
        .context("Failed to hash secret")?;

    println!("{hash}");

    Ok(())
}

/// First line of `reader` without its line terminator.
async fn read_secret<R>(mut reader: R) -> Result<SecretString>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("Failed to read secret from stdin")?;

    let secret = line
        .strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(&line);

    if secret.is_empty() {
        bail!("Refusing to hash an empty secret");
    }

    Ok(SecretString::from(secret.to_string()))
}
