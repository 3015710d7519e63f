//! Login and logout handlers.

use std::io::{self, Write};
use std::time::Duration;

use secrecy::SecretString;

use decora_api::transport::TransportConfig;
use decora_core::{Bridge, BridgeConfig, CoreError, Credentials};

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config::{self, SessionState};
use crate::error::CliError;

pub async fn handle(args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let email = match args.email.clone().or_else(|| config::load().email) {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    let password = SecretString::from(rpassword::prompt_password("Password: ")?);

    let bridge = match try_login(&email, &password, args.code.as_deref(), global).await {
        Ok(bridge) => bridge,
        Err(CoreError::TwoFactorRequired) if args.code.is_none() => {
            // The account demands a code; ask and retry once.
            let code = prompt_line("Two-factor code: ")?;
            try_login(&email, &password, Some(&code), global).await?
        }
        Err(e) => return Err(e.into()),
    };

    let payload = bridge.login_payload().ok_or(CliError::NotLoggedIn)?;
    let count = bridge.devices_snapshot().len();
    bridge.disconnect().await;

    config::save(&SessionState {
        email: Some(email.clone()),
        payload: Some(payload),
    })?;

    if !global.quiet {
        println!("Logged in as {email} ({count} devices)");
    }
    Ok(())
}

pub fn logout(global: &GlobalOpts) -> Result<(), CliError> {
    config::clear()?;
    if !global.quiet {
        println!("Session forgotten");
    }
    Ok(())
}

async fn try_login(
    email: &str,
    password: &SecretString,
    code: Option<&str>,
    global: &GlobalOpts,
) -> Result<Bridge, CoreError> {
    let cfg = BridgeConfig {
        credentials: Some(Credentials {
            email: email.to_owned(),
            password: password.clone(),
            code: code.map(str::to_owned),
        }),
        stream_enabled: false,
        refresh_interval: Duration::ZERO,
        transport: TransportConfig {
            timeout: Duration::from_secs(global.timeout),
        },
        ..BridgeConfig::default()
    };

    let bridge = Bridge::new(cfg)?;
    bridge.connect().await?;
    Ok(bridge)
}

fn prompt_line(prompt: &str) -> Result<String, CliError> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}
