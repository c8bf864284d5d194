/// upexplo - exploration des serveurs et renderers UPnP du réseau
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use upmcontrol::clients::{AvTransportClient, RenderingControlClient};
use upmcontrol::{
    ActionInvoker, ContentDirectoryClient, DeviceDescription, DiscoveryDirectory,
    DiscoveryOptions, UreqInvoker,
};
use upmdidl::{ContentEntry, DirContent};

#[derive(Parser)]
#[command(name = "upexplo")]
#[command(about = "Explore UPnP media servers and renderers", long_about = None)]
struct Cli {
    /// List the devices found on the network
    #[arg(short = 'l', long)]
    list: bool,

    /// Media server (friendly name or UDN)
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Browse the children of an object (root is 0)
    #[arg(short = 'b', long, value_name = "OBJID")]
    browse: Option<String>,

    /// Search the server (under the --browse container, or 0)
    #[arg(short = 'S', long, value_name = "CRITERIA")]
    search: Option<String>,

    /// Print the metadata of an object
    #[arg(short = 'm', long, value_name = "OBJID")]
    metadata: Option<String>,

    /// Print the search capabilities of the server
    #[arg(short = 'c', long)]
    capabilities: bool,

    /// Media renderer (friendly name or UDN): prints its volume
    #[arg(short = 'r', long)]
    renderer: Option<String>,

    /// Set the renderer volume
    #[arg(short = 'V', long, requires = "renderer")]
    volume: Option<u32>,

    /// Renderer transport: 1 plays, 0 stops
    #[arg(short = 'p', long, requires = "renderer")]
    play: Option<u8>,

    /// JSON output
    #[arg(long)]
    json: bool,

    /// Discovery window in seconds
    #[arg(short = 'w', long, default_value_t = 3)]
    window: u64,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    loglevel: String,
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

    if cli.list {
        let devices = directory.devices();
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&devices)?);
        } else {
            for device in &devices {
                print_device(device);
            }
        }
        return Ok(());
    }

    if let Some(name) = &cli.server {
        let device = find(&directory, name)?;
        let cd = ContentDirectoryClient::for_device(invoker, &device)?;

        if cli.capabilities {
            let caps = cd.get_search_capabilities()?;
            if cli.json {
                println!("{}", serde_json::to_string(&caps)?);
            } else {
                println!("{}", caps.into_iter().collect::<Vec<_>>().join(","));
            }
            return Ok(());
        }

        let mut dir = DirContent::new();
        let objid = cli.browse.clone().unwrap_or_else(|| "0".to_string());
        let result = if let Some(criteria) = &cli.search {
            cd.search(&objid, criteria, &mut dir)
        } else if let Some(id) = &cli.metadata {
            cd.get_metadata(id, &mut dir)
        } else {
            cd.read_dir(&objid, &mut dir)
        };
        print_entries(&dir, cli.json)?;
        result?;
        return Ok(());
    }

    if let Some(name) = &cli.renderer {
        let device = find(&directory, name)?;
        if let Some(play) = cli.play {
            let avt = AvTransportClient::for_device(Arc::clone(&invoker), &device)?;
            if play != 0 {
                avt.play()?;
            } else {
                avt.stop()?;
            }
        }
        let rc = RenderingControlClient::for_device(invoker, &device)?;
        if let Some(volume) = cli.volume {
            rc.set_volume(volume)?;
        }
        println!("Volume: {}", rc.get_volume()?);
        return Ok(());
    }

    bail!("nothing to do: use --list, --server or --renderer (see --help)")
}

fn find(directory: &DiscoveryDirectory, name: &str) -> Result<DeviceDescription> {
    directory
        .get_device_by_name(name)
        .with_context(|| format!("device {} not found", name))
}

fn print_device(device: &DeviceDescription) {
    println!(
        "{} {} {} [{}]",
        device.udn, device.friendly_name, device.device_type, device.model_name
    );
}

fn print_entries(dir: &DirContent, json: bool) -> Result<()> {
    let entries: Vec<&ContentEntry> = dir.entries().collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in entries {
        let kind = if entry.is_container { "D" } else { "I" };
        println!(
            "{} {} {} {}",
            kind,
            entry.id,
            entry.title,
            entry.uri().unwrap_or_default()
        );
    }
    Ok(())
}
