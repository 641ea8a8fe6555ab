use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::sources::{NewRtspSource, SourceKind};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::client::HttpDetectionApi;
use crate::config::Config;
use crate::controller::{Action, Dashboard};
use crate::sources::vban::VbanPromotion;
use crate::view::{Control, Document, NotificationLevel, Row, RowKind};

#[derive(Debug, Parser)]
#[command(
    name = "clap-dashboard",
    version,
    about = "Control panel for a clap detection server"
)]
pub struct Cli {
    /// Detection server base URL. Overrides CLAP_SERVER_URL.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// JSON settings document used as the initial dashboard state. Required by
    /// `start`; without it nothing is saved to the server.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load every source list and follow push events until interrupted.
    Watch,
    /// Show whether detection is running.
    Status,
    /// Save the --settings document and start detection.
    Start,
    /// Stop detection.
    Stop,
    /// Manage RTSP sources.
    Rtsp(RtspArgs),
    /// Manage VBAN sources.
    Vban(VbanArgs),
    /// Send a test request to a webhook URL.
    TestWebhook(TestWebhookArgs),
}

#[derive(Debug, Args)]
pub struct RtspArgs {
    #[command(subcommand)]
    pub command: RtspCommand,
}

#[derive(Debug, Subcommand)]
pub enum RtspCommand {
    /// List configured RTSP sources.
    List,
    /// Add an RTSP source.
    Add(AddRtspArgs),
    /// Delete an RTSP source.
    Remove(RemoveArgs),
}

#[derive(Debug, Args)]
pub struct AddRtspArgs {
    #[arg(long)]
    pub name: String,

    /// Stream URL, e.g. rtsp://camera.local/stream1.
    #[arg(long)]
    pub url: String,

    #[arg(long, default_value = "")]
    pub webhook: String,

    /// Call the webhook on detected claps.
    #[arg(long, default_value_t = false)]
    pub enabled: bool,
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    pub id: String,

    /// Skip the confirmation.
    #[arg(long, short = 'y', default_value_t = false)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct VbanArgs {
    #[command(subcommand)]
    pub command: VbanCommand,
}

#[derive(Debug, Subcommand)]
pub enum VbanCommand {
    /// List VBAN streams currently detected on the network.
    Scan,
    /// List saved VBAN sources.
    Saved,
    /// Save a detected VBAN stream by id.
    Save(SaveVbanArgs),
    /// Remove a saved VBAN source.
    Remove(RemoveArgs),
}

#[derive(Debug, Args)]
pub struct SaveVbanArgs {
    /// Id as shown by `vban scan`, e.g. vban_Stream1_192.168.1.20_6980.
    pub id: String,

    #[arg(long, default_value = "")]
    pub webhook: String,
}

#[derive(Debug, Args)]
pub struct TestWebhookArgs {
    /// microphone, rtsp or vban.
    #[arg(long, default_value = "microphone")]
    pub source: SourceKind,

    pub url: String,
}

impl Cli {
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::from_env()?;
        if let Some(server) = &self.server {
            let mut overridden = Config::for_server(server)?;
            overridden.http_timeout = config.http_timeout;
            overridden.debounce = config.debounce;
            overridden.flash_duration = config.flash_duration;
            overridden.top_labels = config.top_labels;
            overridden.reconnect = config.reconnect;
            overridden.vban_refresh = config.vban_refresh;
            config = overridden;
        }
        Ok(config)
    }

    fn embedded_settings(&self) -> Result<Value> {
        let Some(path) = &self.settings else {
            return Ok(Value::Null);
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read settings file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("settings file {} is not JSON", path.display()))
    }
}

/// Run one command against the detection server. Notifications raised along the way
/// are printed once the command finishes.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.config()?;
    let api = Arc::new(HttpDetectionApi::new(
        config.server_url.clone(),
        config.http_timeout,
    )?);
    let document = Arc::new(Document::dashboard());
    let dashboard = Dashboard::new(config, api, document.clone());

    dashboard.initialize(&cli.embedded_settings()?).await?;
    document.clear_notifications();

    let outcome = match cli.command {
        Command::Watch => watch(&dashboard, &document).await,
        Command::Status => {
            let state = if dashboard.session().is_detecting() {
                "running"
            } else {
                "stopped"
            };
            println!("detection {state}");
            Ok(())
        }
        Command::Start => dashboard.dispatch(Action::StartDetection).await.map_err(Into::into),
        Command::Stop => dashboard.dispatch(Action::StopDetection).await.map_err(Into::into),
        Command::Rtsp(args) => match args.command {
            RtspCommand::List => {
                print_rows(&document, &Control::RtspList);
                Ok(())
            }
            RtspCommand::Add(args) => {
                let draft = NewRtspSource {
                    name: args.name,
                    url: args.url,
                    webhook_url: args.webhook,
                    enabled: args.enabled,
                };
                dashboard.dispatch(Action::AddRtsp(draft)).await.map_err(Into::into)
            }
            RtspCommand::Remove(args) => {
                document.confirm_with(args.yes);
                dashboard.dispatch(Action::DeleteRtsp(args.id)).await.map_err(Into::into)
            }
        },
        Command::Vban(args) => match args.command {
            VbanCommand::Scan => {
                print_rows(&document, &Control::VbanList);
                Ok(())
            }
            VbanCommand::Saved => {
                print_rows(&document, &Control::SavedVbanList);
                Ok(())
            }
            VbanCommand::Save(args) => {
                let promotion = VbanPromotion {
                    id: args.id,
                    webhook_url: args.webhook,
                };
                dashboard.dispatch(Action::SaveVban(promotion)).await.map_err(Into::into)
            }
            VbanCommand::Remove(args) => {
                document.confirm_with(args.yes);
                dashboard.dispatch(Action::RemoveVban(args.id)).await.map_err(Into::into)
            }
        },
        Command::TestWebhook(args) => dashboard
            .dispatch(Action::TestWebhook {
                source: args.source,
                url: args.url,
            })
            .await
            .map_err(Into::into),
    };

    print_notifications(&document);
    outcome
}

async fn watch(dashboard: &Dashboard, document: &Document) -> Result<()> {
    print_rows(document, &Control::RtspList);
    print_rows(document, &Control::SavedVbanList);
    let tasks = dashboard.spawn_background();

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for interrupt")?;
    dashboard.shutdown();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

fn print_rows(document: &Document, container: &Control) {
    for row in document.rows(container) {
        println!("{}", format_row(&row));
    }
}

fn format_row(row: &Row) -> String {
    match row.kind {
        RowKind::Card | RowKind::Item => format!("{}\t{}", row.key, row.text),
        RowKind::Placeholder | RowKind::Loading => row.text.clone(),
        RowKind::Error => format!("error: {}", row.text),
    }
}

fn print_notifications(document: &Document) {
    for notification in document.notifications() {
        let level = match notification.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Info => "info",
            NotificationLevel::Error => "error",
        };
        eprintln!("[{level}] {}", notification.message);
    }
}
