use super::context::load_config;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use owo_colors::OwoColorize;
use scrobble_api::{authenticate, AuthError, PinCode, RetryPolicy, SimklClient};
use scrobble_config::{CredentialStore, PathManager};
use serde_json::json;

pub async fn run_auth(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    paths
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create {}: {}", paths.config_dir().display(), e))?;

    let client = SimklClient::new(&config.simkl)
        .map_err(|e| eyre!("Failed to create SIMKL client: {}", e))?
        .with_retry_policy(RetryPolicy::from(&config.simkl.retry));

    let token = authenticate(&client, |pin| show_pin(pin, output))
        .await
        .map_err(|e| match e {
            AuthError::Expired => eyre!("The PIN expired before it was entered. Run 'scrobbler auth' again."),
            other => eyre!("Authentication failed: {}", other),
        })?;

    let mut credentials = CredentialStore::open(paths.credentials_file())
        .map_err(|e| eyre!("Failed to load credentials: {}", e))?;
    credentials.set_simkl_access_token(token.clone());

    // The username is cosmetic, a failure here does not undo the login
    let username = match client.with_access_token(token).fetch_username().await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!(error = %e, "Could not fetch SIMKL username");
            None
        }
    };
    if let Some(name) = &username {
        credentials.set_simkl_username(name.clone());
    }
    credentials
        .save()
        .map_err(|e| eyre!("Failed to save credentials: {}", e))?;

    match username {
        Some(name) => output.success(format!("Logged in to SIMKL as {}", name)),
        None => output.success("Logged in to SIMKL"),
    }
    Ok(())
}

fn show_pin(pin: &PinCode, output: &Output) {
    if output.is_human() {
        output.println(format!(
            "Go to {} and enter the code {}",
            pin.verification_url.cyan(),
            pin.user_code.bold()
        ));
        output.println(format!("Waiting for authorization (expires in {} minutes)...", pin.expires_in / 60));
    } else {
        output.data(
            "pin",
            &json!({
                "user_code": pin.user_code,
                "verification_url": pin.verification_url,
                "expires_in": pin.expires_in,
            }),
        );
    }
}

pub fn run_signout(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let credentials_file = paths.credentials_file();
    if !credentials_file.exists() {
        output.info("Not logged in");
        return Ok(());
    }

    let mut credentials = CredentialStore::open(credentials_file)
        .map_err(|e| eyre!("Failed to load credentials: {}", e))?;
    if credentials.get_simkl_access_token().is_none() {
        output.info("Not logged in");
        return Ok(());
    }
    let username = credentials.get_simkl_username().cloned();
    credentials.clear_simkl();
    credentials
        .save()
        .map_err(|e| eyre!("Failed to save credentials: {}", e))?;

    match username {
        Some(name) => output.success(format!("Signed out {}", name)),
        None => output.success("Signed out of SIMKL"),
    }
    Ok(())
}
