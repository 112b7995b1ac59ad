//! GAAP command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Validate a key (32 or 64 hex chars)
//! gaap check-key 00112233445566778899aabbccddeeff
//!
//! # Encrypt and sign a payload offline, print the frame and headers
//! gaap seal --key 00112233445566778899aabbccddeeff --payload a0
//!
//! # Log in, fetch the profile and log out against a live server
//! GAAP_ALE_BOOTSTRAP_KEY=... gaap probe --base-url https://gaap.example.com \
//!     --email ada@example.com --password hunter2
//! ```

use std::{
    io::{self, Write},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use gaap_client::{
    AuthService, ClientConfig, Environment, SecureClient, SessionObserver, SystemEnv, X_NONCE,
    X_SIGNATURE, X_TIMESTAMP, transport::ReqwestTransport,
};
use gaap_crypto::KeyMaterial;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// GAAP secure transport tool
#[derive(Parser, Debug)]
#[command(name = "gaap")]
#[command(about = "GAAP secure transport tool")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a hex key and report its size
    CheckKey {
        /// Hex key (32 or 64 chars)
        key: String,
    },

    /// Encrypt and sign a payload without sending it
    Seal {
        /// Hex key (32 or 64 chars)
        #[arg(long)]
        key: String,

        /// Hex plaintext
        #[arg(long)]
        payload: String,
    },

    /// Log in, fetch the profile, then log out
    Probe {
        /// Server origin (overrides `GAAP_BASE_URL`)
        #[arg(long)]
        base_url: Option<String>,

        /// Account email
        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long, env = "GAAP_PASSWORD", hide_env_values = true)]
        password: String,

        /// TOTP code for accounts with 2FA
        #[arg(long)]
        code: Option<String>,
    },
}

/// Logs session expiry.
struct LogObserver;

impl SessionObserver for LogObserver {
    fn on_session_expired(&self) {
        tracing::warn!("session expired; log in again");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    match args.command {
        Command::CheckKey { key } => check_key(&key),
        Command::Seal { key, payload } => seal(&key, &payload),
        Command::Probe { base_url, email, password, code } => {
            probe(base_url, &email, &password, code.as_deref()).await
        },
    }
}

fn check_key(key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key = KeyMaterial::from_hex(key)?;
    let bits = key.size().byte_len() * 8;

    writeln!(io::stdout().lock(), "ok: AES-{bits} / HMAC-SHA256")?;
    Ok(())
}

fn seal(key: &str, payload: &str) -> Result<(), Box<dyn std::error::Error>> {
    let key = KeyMaterial::from_hex(key)?;
    let plaintext = hex::decode(payload)?;

    let env = SystemEnv::new();
    let timestamp = env.wall_clock_millis().to_string();
    let nonce = env.request_nonce();

    let sealed = gaap_crypto::encrypt(&plaintext, &key)?;
    let signature = gaap_crypto::sign(&sealed.iv, &sealed.ciphertext, &timestamp, &nonce, &key);
    tracing::debug!(plaintext_len = sealed.plaintext_len(), "payload sealed");

    let mut out = io::stdout().lock();
    writeln!(out, "{X_TIMESTAMP}: {timestamp}")?;
    writeln!(out, "{X_NONCE}: {nonce}")?;
    writeln!(out, "{X_SIGNATURE}: {signature}")?;
    writeln!(out, "frame: {}", hex::encode(sealed.to_frame()))?;
    Ok(())
}

async fn probe(
    base_url: Option<String>,
    email: &str,
    password: &str,
    code: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClientConfig::from_env();
    if let Some(base_url) = base_url {
        config = config.with_base_url(base_url);
    }
    tracing::info!(base_url = %config.base_url, "probing server");

    let transport = ReqwestTransport::new(&config)?;
    let client = SecureClient::new(config, transport).with_observer(Arc::new(LogObserver));
    let auth = AuthService::new(client);

    if !auth.is_available() {
        tracing::error!("bootstrap key not configured");
        return Err("set GAAP_ALE_BOOTSTRAP_KEY".into());
    }

    auth.login(email, password, code).await?;
    tracing::info!("login ok");

    let profile = auth.profile().await?;
    let user = profile.user.unwrap_or_default();
    writeln!(
        io::stdout().lock(),
        "id={} email={} nickname={} 2fa={}",
        user.id,
        user.email,
        user.nickname,
        user.two_factor_enabled
    )?;

    if let Err(e) = auth.logout().await {
        tracing::warn!(error = %e, "server logout failed; local credentials cleared");
    }
    Ok(())
}
