/// scctl - commande des récepteurs Songcast (OpenHome Receiver)
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use upmcontrol::{ActionInvoker, DiscoveryDirectory, DiscoveryOptions, Songcast, UreqInvoker};

const PARSEABLE_SEPARATOR: &str = "||";

#[derive(Parser)]
#[command(name = "scctl")]
#[command(about = "Songcast receivers control", long_about = None)]
#[command(after_help = "Renderers may be designated by friendly name or UDN")]
struct Cli {
    /// Parseable output (fields separated by ||)
    #[arg(short = 'm', long, global = true)]
    parseable: bool,

    /// Discovery window in seconds
    #[arg(short = 'w', long, default_value_t = 3, global = true)]
    window: u64,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn", global = true)]
    loglevel: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List renderers with Songcast Receiver capability
    #[command(short_flag = 'l')]
    List,
    /// List Songcast Senders
    #[command(short_flag = 'L')]
    Senders,
    /// Make the slaves play the same stream as the master receiver
    #[command(short_flag = 's')]
    Slave {
        master: String,
        #[arg(required = true)]
        slaves: Vec<String>,
    },
    /// Make the renderers play the stream of a sender
    #[command(short_flag = 'r')]
    FromSender {
        sender: String,
        #[arg(required = true)]
        renderers: Vec<String>,
    },
    /// Reset renderers from Songcast to Playlist
    #[command(short_flag = 'x')]
    Stop {
        #[arg(required = true)]
        renderers: Vec<String>,
    },
    /// Set the source index of a renderer
    #[command(short_flag = 'i')]
    SourceIndex { renderer: String, index: u32 },
    /// Set the source of a renderer by name
    #[command(short_flag = 'I')]
    SourceName { renderer: String, name: String },
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.loglevel);

    let options = DiscoveryOptions {
        search_window: Duration::from_secs(cli.window.max(1)),
        ..Default::default()
    };
    let directory = DiscoveryDirectory::with_ssdp(options).context("cannot start UPnP discovery")?;
    let invoker: Arc<dyn ActionInvoker> = Arc::new(UreqInvoker::default());
    let songcast = Songcast::new(&directory, invoker);
    let sep = if cli.parseable { PARSEABLE_SEPARATOR } else { " " };

    match cli.command {
        Commands::List => {
            for state in songcast.list_receivers() {
                let detail = match state.status {
                    upmcontrol::ReceiverStatus::Playing => state.uri.as_str(),
                    upmcontrol::ReceiverStatus::Error => state.reason.as_str(),
                    _ => "",
                };
                println!(
                    "{:<6}{}{}{}{}{}{}",
                    state.status.label(),
                    sep,
                    state.name,
                    sep,
                    state.udn,
                    sep,
                    detail
                );
            }
        }
        Commands::Senders => {
            for state in songcast.list_senders() {
                println!(
                    "{}{}{}{}{}{}{}",
                    state.name, sep, state.udn, sep, state.reason, sep, state.uri
                );
            }
        }
        Commands::Slave { master, slaves } => {
            songcast.set_receivers_from_receiver(&master, &slaves)?;
        }
        Commands::FromSender { sender, renderers } => {
            songcast.set_receivers_from_sender(&sender, &renderers)?;
        }
        Commands::Stop { renderers } => {
            songcast.stop_receivers(&renderers)?;
        }
        Commands::SourceIndex { renderer, index } => {
            songcast.set_source_index(&renderer, index)?;
        }
        Commands::SourceName { renderer, name } => {
            songcast.set_source_index_by_name(&renderer, &name)?;
        }
    }
    Ok(())
}
