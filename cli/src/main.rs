// Copyright (c) 2026 Civitas Contributors. MIT License.
// See LICENSE for details.

//! # Civitas CLI
//!
//! Entry point for the `civitas` binary. Parses arguments, initializes
//! logging, builds a `ClientConfig` and runs one subcommand:
//!
//! - `keygen`: generate a principal keypair into a key file
//! - `submit`: credential, encrypt, sign and submit an action
//! - `pending`: list pending transactions for a principal
//! - `receive`: acknowledge one pending transaction
//! - `reject`: decline one pending transaction
//! - `version`: print build version information
//!
//! Results go to stdout as JSON; logs go to stderr.

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;

use civitas_protocol::{
    Action, ActionClient, ClientConfig, HttpLedger, HttpTransport, KemPublicKey, Ledger,
    PendingReconciler, PrincipalKeys, PrincipalSession,
};

use cli::{CivitasCli, Commands, GlobalArgs};

const DEFAULT_LOG_FILTER: &str = "civitas=info,civitas_protocol=info";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CivitasCli::parse();
    logging::init_logging(DEFAULT_LOG_FILTER, cli.global.log_format);

    match cli.command {
        Commands::Keygen(args) => keygen(args),
        Commands::Submit(args) => submit(&cli.global, args).await,
        Commands::Pending(args) => pending(&cli.global, args).await,
        Commands::Receive(args) => receive(&cli.global, args).await,
        Commands::Reject(args) => reject(&cli.global, args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Defaults, then the config file, then explicit flags.
fn resolve_config(global: &GlobalArgs) -> Result<ClientConfig> {
    let mut config = match &global.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            ClientConfig::from_json(&json)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => ClientConfig::default(),
    };

    if let Some(url) = &global.issuer_url {
        config.issuer_url = url.clone();
    }
    if let Some(url) = &global.ledger_url {
        config.ledger_url = url.clone();
    }
    if let Some(timeout_ms) = global.timeout_ms {
        config.request_timeout_ms = timeout_ms;
    }
    if let Some(retries) = global.retries {
        config.max_retries = retries;
    }

    config.validate().context("invalid client configuration")?;
    Ok(config)
}

fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let key_path = &args.key_file;
    if key_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            key_path.display()
        );
    }

    let keys = PrincipalKeys::generate().context("failed to generate principal keypair")?;
    write_key_file(key_path, &keys)?;

    let public = keys.public_key();
    tracing::info!(
        key_path = %key_path.display(),
        verifying_key = %public.verifying_key_hex(),
        "principal keypair generated"
    );
    println!("{}", serde_json::to_string_pretty(&public)?);
    Ok(())
}

async fn submit(global: &GlobalArgs, args: cli::SubmitArgs) -> Result<()> {
    let config = resolve_config(global)?;
    let keys = read_key_file(&args.key_file)?;
    let ledger_key = parse_ledger_key(&args.ledger_key)?;

    let session = PrincipalSession::with_keys(args.principal, keys);
    let client = ActionClient::from_config(&config, ledger_key)?;

    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("submit", %request_id, principal = %session.principal_id());
    let receipt = client
        .submit_action(&session, Action::from(args.action))
        .instrument(span)
        .await
        .context("action submission failed")?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn pending(global: &GlobalArgs, args: cli::PendingArgs) -> Result<()> {
    let reconciler = reconciler(global, args.principal)?;
    let pending = reconciler
        .fetch_pending()
        .await
        .context("failed to fetch pending transactions")?;

    println!("{}", serde_json::to_string_pretty(&pending)?);
    Ok(())
}

async fn receive(global: &GlobalArgs, args: cli::ReceiveArgs) -> Result<()> {
    let reconciler = reconciler(global, args.principal)?;
    reconciler
        .fetch_pending()
        .await
        .context("failed to fetch pending transactions")?;
    let ack = reconciler
        .receive(&args.transaction_id)
        .await
        .with_context(|| format!("failed to receive transaction {}", args.transaction_id))?;

    println!("{}", serde_json::to_string_pretty(&ack)?);
    Ok(())
}

async fn reject(global: &GlobalArgs, args: cli::RejectArgs) -> Result<()> {
    let reconciler = reconciler(global, args.principal)?;
    reconciler
        .fetch_pending()
        .await
        .context("failed to fetch pending transactions")?;
    let ack = reconciler
        .reject(&args.transaction_id)
        .await
        .with_context(|| format!("failed to reject transaction {}", args.transaction_id))?;

    println!("{}", serde_json::to_string_pretty(&ack)?);
    Ok(())
}

fn reconciler(global: &GlobalArgs, principal: String) -> Result<PendingReconciler> {
    let config = resolve_config(global)?;
    let transport = HttpTransport::new(config.request_timeout());
    let ledger: Arc<dyn Ledger> = Arc::new(HttpLedger::new(config.ledger_url, transport));
    Ok(PendingReconciler::new(principal, ledger))
}

fn write_key_file(path: &Path, keys: &PrincipalKeys) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open key file {}", path.display()))?;

    // `mode` only applies on creation; an overwritten file keeps its old bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }

    file.write_all(keys.to_seed_hex().as_bytes())
        .with_context(|| format!("failed to write key file {}", path.display()))?;
    Ok(())
}

fn read_key_file(path: &Path) -> Result<PrincipalKeys> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    PrincipalKeys::from_seed_hex(contents.trim())
        .with_context(|| format!("malformed key file {}", path.display()))
}

/// Hex key inline, or `@path` naming a file that holds it.
fn parse_ledger_key(arg: &str) -> Result<KemPublicKey> {
    let hex = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ledger key file {path}"))?,
        None => arg.to_string(),
    };
    KemPublicKey::from_hex(hex.trim()).context("invalid ledger public key")
}

fn print_version() {
    use civitas_protocol::config;

    println!("civitas  {}", env!("CARGO_PKG_VERSION"));
    println!("protocol {}", config::PROTOCOL_VERSION);
    println!(
        "crypto   {} / {} / {}",
        config::SIGNING_ALGORITHM,
        config::KEM_ALGORITHM,
        config::SYMMETRIC_ALGORITHM
    );
}
