//! Runs one login by hand.
//!
//! Without arguments it prints the authorization URL to open in a browser.
//! After logging in, copy the `code` query parameter from the callback URL
//! and run again with it to see the verified session:
//!
//! ```text
//! cargo run --example oauth_callback -- demos/rp_config.yaml
//! cargo run --example oauth_callback -- demos/rp_config.yaml <code>
//! ```
//!
//! With no config path the `OAUTH_*` / `SF_*` environment variables are used.

use serde::Deserialize;
use sf_oidc_rp::prelude::*;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing::Level;

#[derive(Debug, Deserialize)]
struct RpAppConfig {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    login_url: Option<String>,
    key_id_override: Option<String>,
    http_timeout_seconds: Option<u64>,
    leeway_seconds: Option<u64>,
    log_level: Option<String>,
}

fn load_config(path: &str) -> Result<(Config, Level), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let app_config: RpAppConfig = serde_yaml::from_str(&raw)?;

    let mut builder = ConfigBuilder::new()
        .client_id(app_config.client_id)
        .client_secret(app_config.client_secret)
        .redirect_uri(&app_config.redirect_uri)?;
    if let Some(login_url) = &app_config.login_url {
        builder = builder.login_url(login_url)?;
    }
    if let Some(kid) = app_config.key_id_override {
        builder = builder.key_id_override(kid);
    }
    if let Some(secs) = app_config.http_timeout_seconds {
        builder = builder.http_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = app_config.leeway_seconds {
        builder = builder.leeway(Duration::from_secs(secs));
    }

    let level = match app_config.log_level.as_deref() {
        Some(level) => level.parse().map_err(|_| format!("invalid log_level: {level}"))?,
        None => Level::INFO,
    };
    Ok((builder.build()?, level))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let is_yaml = args.first().is_some_and(|a| a.ends_with(".yaml") || a.ends_with(".yml"));
    let config_path = if is_yaml { Some(args.remove(0)) } else { None };
    let code = args.into_iter().next();

    let (config, level) = match config_path.as_deref() {
        Some(path) => load_config(path)?,
        None => (Config::from_env()?, Level::INFO),
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into()))
        .init();

    let authenticator = Authenticator::new(config)?;

    let Some(code) = code else {
        println!("Open this URL to log in:\n{}", authenticator.config().authorization_url(None)?);
        return Ok(());
    };

    let store = MemorySessionStore::with_max_age(Duration::from_secs(60));
    match authenticator.login(&code, &store).await {
        Ok(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(e) => {
            // The detailed reason is in the log; this is what a user would see.
            eprintln!("{} {}", e.status_code(), e.public_message());
            std::process::exit(1);
        }
    }
}
