//! # CLI Interface
//!
//! `clap` derive definitions for the `civitas` binary. Connection settings
//! are global flags with `CIVITAS_*` environment fallbacks; any left unset
//! come from `--config` or the built-in defaults.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Civitas client: submit credentialed, encrypted actions and acknowledge
/// pending transactions.
#[derive(Parser, Debug)]
#[command(
    name = "civitas",
    about = "Civitas credentialed action client",
    version,
    propagate_version = true
)]
pub struct CivitasCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// JSON client configuration file. Flags below override its fields.
    #[arg(long, global = true, env = "CIVITAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the credential Issuer.
    #[arg(long, global = true, env = "CIVITAS_ISSUER_URL")]
    pub issuer_url: Option<String>,

    /// Base URL of the Ledger.
    #[arg(long, global = true, env = "CIVITAS_LEDGER_URL")]
    pub ledger_url: Option<String>,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true, env = "CIVITAS_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Retries for transient network failures (0 = never retry).
    #[arg(long, global = true, env = "CIVITAS_RETRIES")]
    pub retries: Option<u32>,

    /// Log output format.
    #[arg(long, global = true, env = "CIVITAS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a principal keypair and store its seed in a key file.
    Keygen(KeygenArgs),
    /// Obtain a credential, then encrypt, sign and submit an action.
    Submit(SubmitArgs),
    /// List transactions waiting for a principal.
    Pending(PendingArgs),
    /// Acknowledge one pending transaction.
    Receive(ReceiveArgs),
    /// Decline one pending transaction.
    Reject(RejectArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Where to write the hex seed. Created with mode 0600 on Unix.
    #[arg(long, short = 'k', env = "CIVITAS_KEY_FILE")]
    pub key_file: PathBuf,

    /// Overwrite an existing key file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Key file written by `keygen`.
    #[arg(long, short = 'k', env = "CIVITAS_KEY_FILE")]
    pub key_file: PathBuf,

    /// Principal identifier known to the Issuer.
    #[arg(long, short = 'p', env = "CIVITAS_PRINCIPAL")]
    pub principal: String,

    /// Ledger ML-KEM-768 public key: hex, or `@path` to read it from a file.
    #[arg(long, env = "CIVITAS_LEDGER_KEY")]
    pub ledger_key: String,

    /// The action, e.g. `transfer:100`.
    pub action: String,
}

#[derive(Parser, Debug)]
pub struct PendingArgs {
    /// Principal whose pending transactions to list.
    #[arg(long, short = 'p', env = "CIVITAS_PRINCIPAL")]
    pub principal: String,
}

#[derive(Parser, Debug)]
pub struct ReceiveArgs {
    /// Principal the transaction is addressed to.
    #[arg(long, short = 'p', env = "CIVITAS_PRINCIPAL")]
    pub principal: String,

    /// Transaction to acknowledge.
    pub transaction_id: String,
}

#[derive(Parser, Debug)]
pub struct RejectArgs {
    /// Principal the transaction is addressed to.
    #[arg(long, short = 'p', env = "CIVITAS_PRINCIPAL")]
    pub principal: String,

    /// Transaction to decline.
    pub transaction_id: String,
}
