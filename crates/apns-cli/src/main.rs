//! Thin CLI driver over `apns-client`: all protocol semantics stay in the
//! library crate, this binary only owns argument parsing, configuration
//! loading, and process exit codes.

mod config;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context as _, Result};
use apns_client::{Context, EnhancedEncoder, Mode, Options};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "apns-cli", version, about = "Send APNs legacy-protocol notifications and drain the feedback service")]
struct Cli {
    /// Path to a config file supplying defaults for the flags below
    /// (TOML/YAML/JSON; format is detected from the extension).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the gateway and deliver a payload to a list of device tokens.
    Send(SendArgs),
    /// Connect to the feedback service and print expired tokens until it idles.
    Feedback(FeedbackArgs),
    /// Print the crate version.
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Sandbox,
    Production,
}

impl From<ModeArg> for Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Sandbox => Mode::Sandbox,
            ModeArg::Production => Mode::Production,
        }
    }
}

#[derive(Args)]
struct CredentialArgs {
    /// Sandbox or production APNs environment. Defaults to the config
    /// file's `mode`, or production if that is unset too.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// PEM certificate path; requires `--key`.
    #[arg(long)]
    cert: Option<PathBuf>,
    /// PEM private key path.
    #[arg(long)]
    key: Option<PathBuf>,
    /// Passphrase for an encrypted PEM private key.
    #[arg(long)]
    key_password: Option<String>,
    /// PKCS#12 bundle path; requires `--pkcs12-password`.
    #[arg(long)]
    pkcs12: Option<PathBuf>,
    /// Password for the PKCS#12 bundle.
    #[arg(long)]
    pkcs12_password: Option<String>,
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    credentials: CredentialArgs,
    /// Path to a JSON file containing the already-encoded APNs payload.
    #[arg(long)]
    payload: PathBuf,
    /// Path to a file of hex device tokens, one per line.
    #[arg(long)]
    tokens: PathBuf,
    /// Reconnect and resume after a recoverable delivery error.
    #[arg(long)]
    reconnect_on_error: bool,
}

#[derive(Args)]
struct FeedbackArgs {
    #[command(flatten)]
    credentials: CredentialArgs,
}

/// Merge CLI flags over config-file/environment defaults and build a
/// connected-but-not-yet-`connect`ed [`Context`].
fn build_context(credentials: &CredentialArgs, defaults: &config::Defaults) -> Result<Context> {
    let mut ctx = Context::init();

    let mode = credentials
        .mode
        .map(Mode::from)
        .or_else(|| match defaults.mode.as_deref() {
            Some("sandbox") => Some(Mode::Sandbox),
            Some("production") => Some(Mode::Production),
            _ => None,
        })
        .unwrap_or_default();
    ctx.set_mode(mode);

    let cert = credentials.cert.clone().or_else(|| defaults.cert.clone());
    let key = credentials.key.clone().or_else(|| defaults.key.clone());
    let key_password = credentials
        .key_password
        .clone()
        .or_else(|| defaults.key_password.clone());
    let pkcs12 = credentials.pkcs12.clone().or_else(|| defaults.pkcs12.clone());
    let pkcs12_password = credentials
        .pkcs12_password
        .clone()
        .or_else(|| defaults.pkcs12_password.clone());

    match (cert, pkcs12) {
        (Some(cert), None) => {
            let key = key.context("--key is required alongside --cert")?;
            ctx.set_certificate(cert, key, key_password);
        }
        (None, Some(pkcs12)) => {
            let password = pkcs12_password.context("--pkcs12-password is required alongside --pkcs12")?;
            ctx.set_pkcs12(pkcs12, password);
        }
        (Some(_), Some(_)) => bail!("specify either --cert/--key or --pkcs12, not both"),
        (None, None) => bail!("credentials are required: --cert/--key or --pkcs12/--pkcs12-password"),
    }

    Ok(ctx)
}

fn read_tokens(path: &PathBuf) -> Result<Vec<String>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading token list {path:?}"))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn run_send(args: SendArgs, defaults: &config::Defaults) -> Result<()> {
    let mut ctx = build_context(&args.credentials, defaults)?;
    let reconnect_on_error = args.reconnect_on_error || defaults.reconnect_on_error.unwrap_or(false);
    if reconnect_on_error {
        ctx.set_behavior(Options::RECONNECT_ON_ERROR);
    }

    let payload =
        fs::read(&args.payload).with_context(|| format!("reading payload file {:?}", args.payload))?;
    let tokens = read_tokens(&args.tokens)?;

    ctx.connect()
        .map_err(|e| anyhow::anyhow!("{}", e.error_string()))?;
    let outcome = apns_client::send(&mut ctx, &EnhancedEncoder::default(), &payload, &tokens)
        .map_err(|e| anyhow::anyhow!("{}", e.error_string()))?;

    println!("status: success");
    for token in &outcome.invalid_tokens {
        println!("invalid: {token}");
    }
    Ok(())
}

fn run_feedback(args: FeedbackArgs, defaults: &config::Defaults) -> Result<()> {
    let mut ctx = build_context(&args.credentials, defaults)?;
    ctx.feedback_connect()
        .map_err(|e| anyhow::anyhow!("{}", e.error_string()))?;

    loop {
        let tokens = apns_client::feedback(&mut ctx)
            .map_err(|e| anyhow::anyhow!("{}", e.error_string()))?;
        if tokens.is_empty() {
            break;
        }
        for token in tokens {
            println!("{token}");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let defaults = match config::load(cli.config.as_deref()) {
        Ok(defaults) => defaults,
        Err(err) => {
            eprintln!("error: failed to load configuration: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Send(args) => run_send(args, &defaults),
        Command::Feedback(args) => run_feedback(args, &defaults),
        Command::Version => {
            println!("{}", apns_client::version());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
