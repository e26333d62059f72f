//! # signal-gateway
//!
//! Command-line host for the Signal daemon gateway: check the daemon, stream
//! incoming messages as JSON lines, send messages and reactions, and inspect
//! group and identity directories.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use signal_gateway::{
    Attachment, DeleteRequest, DomainMessage, GatewaySettings, ListenerError, Quote,
    ReactionRequest, SendMessage, SignalGateway, directory_json,
};

/// Signal daemon gateway client.
#[derive(Parser, Debug)]
#[command(name = "signal-gateway", about = "Signal daemon gateway client")]
struct Cli {
    /// Daemon base URL (overrides settings).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log level filter (overrides settings; `RUST_LOG` wins over both).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Settings file (defaults to `~/.signal-gateway/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the daemon version.
    Version,
    /// Print each incoming message as one JSON line until Ctrl-C.
    Listen {
        /// Only print messages received by this account.
        #[arg(long)]
        account: Option<String>,
    },
    /// Send a text message.
    Send(SendArgs),
    /// Send or withdraw a reaction.
    React(ReactArgs),
    /// Remotely delete a sent message.
    Delete(DeleteArgs),
    /// List groups of an account.
    Groups {
        /// Account to query.
        #[arg(long)]
        account: String,
    },
    /// List identities known to an account.
    Identities {
        /// Account to query.
        #[arg(long)]
        account: String,
    },
    /// Issue a raw JSON-RPC call.
    Rpc {
        /// Method name.
        method: String,
        /// JSON params object.
        #[arg(default_value = "{}")]
        params: String,
    },
}

#[derive(Args, Debug)]
struct Targets {
    /// Recipient phone number or UUID (repeatable).
    #[arg(long = "to")]
    recipients: Vec<String>,

    /// Group id or title (repeatable; takes precedence over --to).
    #[arg(long = "group")]
    groups: Vec<String>,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Sending account.
    #[arg(long)]
    account: String,

    /// Message body.
    #[arg(long)]
    message: String,

    #[command(flatten)]
    targets: Targets,

    /// Timestamp of a message to quote.
    #[arg(long, requires = "quote_author")]
    quote_timestamp: Option<i64>,

    /// Author of the quoted message.
    #[arg(long, requires = "quote_timestamp")]
    quote_author: Option<String>,

    /// Text of the quoted message.
    #[arg(long, default_value = "")]
    quote_message: String,

    /// File to attach.
    #[arg(long)]
    attach: Option<PathBuf>,

    /// MIME type of the attachment.
    #[arg(long, default_value = "application/octet-stream")]
    mime: String,
}

#[derive(Args, Debug)]
struct ReactArgs {
    /// Reacting account.
    #[arg(long)]
    account: String,

    /// Reaction emoji.
    #[arg(long)]
    emoji: String,

    /// Author of the target message.
    #[arg(long)]
    target_author: String,

    /// Timestamp of the target message.
    #[arg(long)]
    target_timestamp: i64,

    /// Withdraw the reaction.
    #[arg(long)]
    remove: bool,

    #[command(flatten)]
    targets: Targets,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    /// Account that sent the message.
    #[arg(long)]
    account: String,

    /// Timestamp of the message.
    #[arg(long)]
    target_timestamp: i64,

    #[command(flatten)]
    targets: Targets,
}

impl Cli {
    /// Settings from file and environment, then command-line overrides.
    fn settings(&self) -> Result<GatewaySettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(signal_settings::settings_path);
        let mut settings = signal_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(url) = &self.url {
            settings.daemon_url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

impl SendArgs {
    fn into_request(self) -> Result<SendMessage> {
        let mut request = SendMessage::new(self.account, self.message);
        request.recipients = self.targets.recipients;
        request.groups = self.targets.groups;

        if let (Some(timestamp), Some(author)) = (self.quote_timestamp, self.quote_author) {
            request = request.with_quote(Quote::new(timestamp, author, self.quote_message));
        }
        if let Some(path) = self.attach {
            let content = std::fs::read(&path)
                .with_context(|| format!("Failed to read attachment: {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            request = request.with_attachment(Attachment::from_bytes(self.mime, filename, &content));
        }
        Ok(request)
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn listen(gateway: &SignalGateway, account: Option<String>) -> Result<()> {
    let listener = move |message: &DomainMessage| -> Result<(), ListenerError> {
        if account.as_deref().is_some_and(|a| a != message.account()) {
            return Ok(());
        }
        println!("{}", serde_json::to_string(message)?);
        Ok(())
    };
    let id = gateway.add_message_listener(Arc::new(listener));
    tracing::info!(listener = %id, "listening for messages, Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    let _ = gateway.remove_message_listener(&id);
    Ok(())
}

async fn run(cli: Cli, gateway: &SignalGateway) -> Result<()> {
    match cli.command {
        Command::Version => {
            let Some(version) = gateway.signal_version().await else {
                bail!("Could not obtain version from {}", gateway.endpoint());
            };
            println!("{version}");
        }
        Command::Listen { account } => {
            let version = gateway.enable().await?;
            tracing::info!(%version, "gateway enabled");
            listen(gateway, account).await?;
        }
        Command::Send(args) => {
            let _ = gateway.enable_rpc_only().await?;
            let results = gateway.send_message(&args.into_request()?).await?;
            print_json(&Value::Array(results))?;
        }
        Command::React(args) => {
            let _ = gateway.enable_rpc_only().await?;
            let request = ReactionRequest {
                account: args.account,
                emoji: args.emoji,
                target_author: args.target_author,
                target_timestamp: args.target_timestamp,
                remove: args.remove,
                recipients: args.targets.recipients,
                groups: args.targets.groups,
            };
            print_json(&Value::Array(gateway.send_reaction(&request).await?))?;
        }
        Command::Delete(args) => {
            let _ = gateway.enable_rpc_only().await?;
            let request = DeleteRequest {
                account: args.account,
                target_timestamp: args.target_timestamp,
                recipients: args.targets.recipients,
                groups: args.targets.groups,
            };
            print_json(&Value::Array(gateway.delete_message(&request).await?))?;
        }
        Command::Groups { account } => {
            let _ = gateway.enable_rpc_only().await?;
            print_json(&directory_json(gateway.groups(&account).await?.as_ref()))?;
        }
        Command::Identities { account } => {
            let _ = gateway.enable_rpc_only().await?;
            print_json(&directory_json(gateway.identities(&account).await?.as_ref()))?;
        }
        Command::Rpc { method, params } => {
            let params: Value =
                serde_json::from_str(&params).context("Params are not valid JSON")?;
            let _ = gateway.enable_rpc_only().await?;
            print_json(&gateway.send_json_rpc(&method, params, None).await?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = cli.settings()?;
    signal_logging::init_from_settings(&settings.logging);

    let gateway = SignalGateway::new(settings).context("Failed to create gateway")?;
    let outcome = run(cli, &gateway).await;
    gateway.disable().await;
    outcome
}
