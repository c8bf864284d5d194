/// upmpdrenderer - renderer UPnP/OpenHome pour MPD
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use upmconfig::Config;
use upmcontrol::{ContentDirectoryClient, ControlPointError, DiscoveryDirectory, DiscoveryOptions, UreqInvoker};
use upmrenderer::metacache::{CACHE_FILE_NAME, load_cache};
use upmrenderer::{
    CacheSaver, MediaServerContext, MpdClient, ProtocolInfo, RendererContext, RendererOptions,
    build_media_server, build_renderer, media_server_info, renderer_info,
};
use upmupnp::server::SERVER_HEADER;
use upmupnp::ssdp::{SsdpDevice, SsdpServer};
use upmupnp::{UpnpDevice, UpnpServer};

#[derive(Parser)]
#[command(name = "upmpdrenderer")]
#[command(about = "UPnP/OpenHome media renderer for MPD", long_about = None)]
struct Cli {
    /// Configuration directory
    #[arg(short = 'c', long, default_value = "")]
    config: String,

    /// Log level (overrides the configuration, overridden by RUST_LOG)
    #[arg(short = 'l', long)]
    loglevel: Option<String>,
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cache des métadonnées de la Playlist et son écrivain.
fn meta_cache(config: &Config) -> Result<(upmrenderer::MetaCache, Option<CacheSaver>)> {
    if !config.get_oh_meta_persist() {
        return Ok((Default::default(), None));
    }
    let path = config.get_cache_dir()?.join(CACHE_FILE_NAME);
    let cache = match load_cache(&path) {
        Ok(cache) => cache,
        Err(e) => {
            warn!("⚠️ Cannot read metadata cache {}: {}", path.display(), e);
            Default::default()
        }
    };
    let saver = CacheSaver::start(path).context("starting the metadata cache writer")?;
    Ok((cache, Some(saver)))
}

/// Le serveur relayé est cherché sur le réseau à la première requête.
fn media_server_context(name: String) -> MediaServerContext {
    MediaServerContext::with_resolver(Box::new(move || {
        let directory = DiscoveryDirectory::with_ssdp(DiscoveryOptions::default())?;
        let device = directory
            .get_device_by_name(&name)
            .ok_or_else(|| ControlPointError::DeviceNotFound(name.clone()))?;
        ContentDirectoryClient::for_device(Arc::new(UreqInvoker::default()), &device)
    }))
}

fn ssdp_device(server: &UpnpServer, device: &dyn UpnpDevice) -> SsdpDevice {
    let info = device.info();
    let mut ssdp = SsdpDevice::new(
        &info.udn,
        &info.device_type,
        &server.description_url(&info.udn),
        SERVER_HEADER,
    );
    for service in device.services() {
        ssdp.add_notification_type(service.service_type);
    }
    ssdp
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                warn!("⚠️ Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run(config: Config) -> Result<()> {
    let mpd = MpdClient::connect(
        &config.get_mpd_host(),
        config.get_mpd_port(),
        &config.get_mpd_password(),
    )
    .context("connecting to MPD")?;

    let protocol_file = config.get_protocol_info_file();
    let protocol_info = ProtocolInfo::load((!protocol_file.is_empty()).then(|| Path::new(&protocol_file)))
        .with_context(|| format!("reading protocol info {}", protocol_file))?;

    let (cache, saver) = meta_cache(&config)?;
    let options = RendererOptions::from_config(&config);
    let ctx = RendererContext::new(Box::new(mpd), options, protocol_info).with_meta_cache(cache, saver);

    let friendly_name = config.get_friendly_name();
    let renderer: Arc<dyn UpnpDevice> = Arc::new(build_renderer(
        renderer_info(&config.get_device_udn("renderer")?, &friendly_name),
        ctx,
    ));

    let (upnp_ip, upnp_iface) = (config.get_upnp_ip(), config.get_upnp_iface());
    let ip = upmupnp::netif::local_ipv4(
        (!upnp_ip.is_empty()).then_some(upnp_ip.as_str()),
        (!upnp_iface.is_empty()).then_some(upnp_iface.as_str()),
    );
    let port = config.get_upnp_port();
    let listener = TcpListener::bind((ip, port))
        .await
        .with_context(|| format!("binding {}:{}", ip, port))?;
    let port = listener.local_addr()?.port();

    let mut server = UpnpServer::new(&format!("http://{}:{}", ip, port));
    let mut devices: Vec<Arc<dyn UpnpDevice>> = vec![renderer];

    let proxied = config.get_ms_proxy();
    if !proxied.is_empty() {
        let media_server = build_media_server(
            media_server_info(&config.get_device_udn("mediaserver")?, &config.get_ms_friendly_name()),
            media_server_context(proxied.clone()),
        );
        info!("✅ Media Server proxy for {}", proxied);
        devices.push(Arc::new(media_server));
    }
    for device in &devices {
        server.add_device(Arc::clone(device));
    }

    let mut ssdp = SsdpServer::new(ip);
    ssdp.start().context("starting SSDP")?;
    for device in &devices {
        ssdp.add_device(ssdp_device(&server, device.as_ref()));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let served = server.serve(listener, shutdown_rx).await;
    ssdp.stop();
    served.context("UPnP server")?;
    info!("👋 {} stopped", friendly_name);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("upmpdrenderer: cannot load configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let level = cli.loglevel.unwrap_or_else(|| config.get_log_level());
    init_logging(&level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
