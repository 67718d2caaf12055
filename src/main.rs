mod config;
mod console;
mod debug_log;
mod display;
mod fault;
mod orchestrator;
mod osd;
mod protocol;
mod server;
mod service;
mod settings;
mod shortcuts;
mod socket;
mod timer;
mod transport;
mod trigger;

use crate::config::ServiceConfig;
use crate::debug_log::DebugLogEntry;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::settings::SettingsUpdate;
use crate::socket::{DEFAULT_SOCKET_PATH, expand_socket_path};
use crate::transport::AsyncTransport;
use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(name = "scarify")]
#[command(about = "Random full-screen jumpscare overlays for Wayland desktops")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the jumpscare service
    Service {
        #[command(flatten)]
        config: ServiceConfig,
    },

    /// Fire a jumpscare now, even when disabled
    Test {
        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Report that an overlay finished showing
    Complete {
        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Switch random jumpscares on or off
    Toggle {
        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Open the debug console
    Debug {
        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Open the settings console
    OpenSettings {
        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Show settings, or change them when any flag is given
    Settings {
        #[arg(long)]
        chance_denominator: Option<f64>,

        #[arg(long)]
        duration_ms: Option<f64>,

        /// Whether overlays should play audio
        #[arg(long)]
        audio: Option<bool>,

        /// Whether random jumpscares are armed
        #[arg(long)]
        enabled: Option<bool>,

        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Show trigger state, surface count and settings
    Status {
        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Print the debug log, oldest first
    Logs {
        /// Keep printing new entries as they are recorded
        #[arg(long)]
        follow: bool,

        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },

    /// Record an overlay-side failure in the debug log
    ReportError {
        #[arg(long)]
        message: String,

        /// Extra JSON payload
        #[arg(long)]
        data: Option<String>,

        #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
        socket_path: String,
    },
}

fn client(socket_path: &str) -> AsyncTransport {
    AsyncTransport::new(expand_socket_path(socket_path))
}

async fn request(socket_path: &str, message: ClientMessage) -> Result<ServerMessage> {
    match client(socket_path).send_request(&message).await? {
        ServerMessage::Error { error, .. } => Err(anyhow!(error)),
        response => Ok(response),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_entry(entry: &DebugLogEntry) {
    let kind = entry.kind.as_str();
    match &entry.data {
        Some(data) => println!("{} [{}] {} {}", entry.timestamp, kind, entry.message, data),
        None => println!("{} [{}] {}", entry.timestamp, kind, entry.message),
    }
}

fn settings_update(
    chance_denominator: Option<f64>,
    duration_ms: Option<f64>,
    audio: Option<bool>,
    enabled: Option<bool>,
) -> SettingsUpdate {
    SettingsUpdate {
        chance_denominator: chance_denominator.map(|v| json!(v)),
        duration_ms: duration_ms.map(|v| json!(v)),
        audio_enabled: audio.map(|v| json!(v)),
        enabled: enabled.map(|v| json!(v)),
    }
}

async fn settings_command(socket_path: &str, update: SettingsUpdate) -> Result<()> {
    let message = if update.is_empty() {
        ClientMessage::new_get_settings()
    } else {
        ClientMessage::new_update_settings(update)
    };

    match request(socket_path, message).await {
        Ok(ServerMessage::Settings { settings, .. }) => print_json(&settings),
        Ok(other) => bail!("Unexpected response: {:?}", other),
        Err(e) => {
            println!("Save failed: {}", e);
            Err(e)
        }
    }
}

async fn logs_command(socket_path: &str, follow: bool) -> Result<()> {
    let entries = match request(socket_path, ClientMessage::new_get_debug_logs()).await? {
        ServerMessage::DebugLogs { entries, .. } => entries,
        other => bail!("Unexpected response: {:?}", other),
    };
    for entry in entries.iter().rev() {
        print_entry(entry);
    }

    if !follow {
        return Ok(());
    }

    let mut conn = client(socket_path).connect().await?;
    conn.write_message(&ClientMessage::new_subscribe_debug())
        .await?;

    while let Some(message) = conn.read_server_message().await? {
        match message {
            ServerMessage::DebugEntry { entry } => print_entry(&entry),
            ServerMessage::Subscribed { .. } => {}
            ServerMessage::Error { error, .. } => bail!(error),
            other => log::debug!("Ignoring message: {:?}", other),
        }
    }

    eprintln!("Service closed the debug stream");
    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Service { config } => service::run(config).await,

        Commands::Test { socket_path } => {
            match request(&socket_path, ClientMessage::new_trigger()).await? {
                ServerMessage::TriggerResult { outcome, .. } => print_json(&outcome),
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        Commands::Complete { socket_path } => {
            request(&socket_path, ClientMessage::new_complete()).await?;
            Ok(())
        }

        Commands::Toggle { socket_path } => {
            match request(&socket_path, ClientMessage::new_toggle_enabled()).await? {
                ServerMessage::Enabled { enabled, .. } => {
                    println!("Jumpscares {}", if enabled { "enabled" } else { "disabled" });
                    Ok(())
                }
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        Commands::Debug { socket_path } => {
            request(&socket_path, ClientMessage::new_open_debug()).await?;
            Ok(())
        }

        Commands::OpenSettings { socket_path } => {
            request(&socket_path, ClientMessage::new_open_settings()).await?;
            Ok(())
        }

        Commands::Settings {
            chance_denominator,
            duration_ms,
            audio,
            enabled,
            socket_path,
        } => {
            let update = settings_update(chance_denominator, duration_ms, audio, enabled);
            settings_command(&socket_path, update).await
        }

        Commands::Status { socket_path } => {
            match request(&socket_path, ClientMessage::new_get_debug_status()).await? {
                ServerMessage::DebugStatus { status, .. } => print_json(&status),
                other => bail!("Unexpected response: {:?}", other),
            }
        }

        Commands::Logs {
            follow,
            socket_path,
        } => logs_command(&socket_path, follow).await,

        Commands::ReportError {
            message,
            data,
            socket_path,
        } => {
            let data = match data {
                Some(raw) => Some(serde_json::from_str::<serde_json::Value>(&raw)?),
                None => None,
            };
            let info = json!({ "message": message, "data": data });
            request(&socket_path, ClientMessage::new_report_error(info)).await?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
