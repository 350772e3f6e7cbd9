use anyhow::{Context, Result, bail};
use cinelist_config::{ConfigLoad, ClientConfig};
use cinelist_core::model::RecoveryLink;
use cinelist_core::{Remediation, SessionError, SessionState};
use tracing::info;

use crate::wiring::connect;

pub async fn resolve(config: &ClientConfig, link: Option<&str>) -> Result<()> {
    let link = link
        .map(RecoveryLink::parse)
        .transpose()
        .context("failed to parse recovery link")?;
    let wired = connect(config, false)?;

    match wired.client.resolve(link.as_ref()).await {
        Ok(state) => {
            print_state(&state);
            Ok(())
        }
        Err(err) => session_failure(err),
    }
}

pub async fn sync(
    config: &ClientConfig,
    email: &str,
    password: &str,
) -> Result<()> {
    let wired = connect(config, false)?;
    wired
        .auth
        .sign_in_with_password(email, password)
        .await
        .context("sign-in failed")?;

    let client = &wired.client;
    if let Err(err) = client.resolve(None).await {
        return session_failure(err);
    }

    if !client.sync_all_data().await {
        let err = client
            .sync_error()
            .context("sync failed without reporting an error")?;
        for failure in err.failures() {
            eprintln!("  {failure}");
        }
        eprintln!("{}", remediation_hint(err.remediation()));
        bail!(err);
    }

    for store in client.collections() {
        let id = store.id().as_str();
        println!("{id:<12} {} items", store.items().len());
    }
    info!("all collections synchronized");
    Ok(())
}

pub async fn reset_password(
    config: &ClientConfig,
    link: &str,
    password: &str,
    confirm: &str,
) -> Result<()> {
    let link =
        RecoveryLink::parse(link).context("failed to parse recovery link")?;
    let wired = connect(config, false)?;
    let resolver = wired.client.resolver();

    if let Err(err) = wired.client.resolve(Some(&link)).await {
        return session_failure(err);
    }

    let redirect = resolver
        .complete_password_reset(password, confirm)
        .await
        .context("password reset failed")?;
    println!(
        "Password updated. Returning to login in {}s.",
        redirect.delay().as_secs()
    );
    redirect.wait().await;
    println!("Sign in with your new password.");
    Ok(())
}

pub async fn request_reset(config: &ClientConfig, email: &str) -> Result<()> {
    let wired = connect(config, false)?;
    let redirect_to = config.backend.redirect_url.as_ref().map(|u| u.as_str());
    wired
        .client
        .resolver()
        .request_password_reset(email, redirect_to)
        .await
        .context("could not request a recovery email")?;
    println!("If an account exists for {email}, a recovery email is on its way.");
    Ok(())
}

pub fn print_config(load: &ConfigLoad) -> Result<()> {
    let config = &load.config;
    println!("# source: {:?}", config.metadata.source);
    if config.metadata.env_file_loaded {
        println!("# .env file loaded");
    }
    for warning in load.warnings.iter() {
        println!("# warning: {}", warning.message);
    }
    print!("{}", config.to_redacted_toml()?);
    Ok(())
}

fn print_state(state: &SessionState) {
    println!("status:     {}", state.status);
    println!("generation: {}", state.generation);
    if let Some(at) = state.established_at {
        println!("since:      {}", at.to_rfc3339());
    }
}

fn session_failure(err: SessionError) -> Result<()> {
    eprintln!("{}", remediation_hint(err.remediation()));
    Err(err.into())
}

fn remediation_hint(remediation: Remediation) -> &'static str {
    match remediation {
        Remediation::RequestNewLink => {
            "hint: run `cinelistctl request-reset --email <EMAIL>` for a new link"
        }
        Remediation::SignIn => "hint: sign in again with `cinelistctl sync`",
        Remediation::Retry => "hint: check connectivity and try again",
    }
}
