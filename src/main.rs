//! RTSP/MJPEG streaming server CLI

// Use jemalloc for better memory management (optional feature)
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::Parser;
use rtsp_mjpeg_server::config::Config;
use rtsp_mjpeg_server::rtsp::{RtspServer, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rtsp-mjpeg-server")]
#[command(about = "RTSP server streaming still/pre-encoded JPEG content as RTP/MJPEG")]
#[command(version)]
struct Cli {
    /// TCP port to listen on for RTSP requests.
    #[arg(short = 'p', long, default_value_t = 1025)]
    port: u16,

    /// Address advertised to clients in SDP and bound for the RTSP listener.
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Directory JPEG files are served from.
    #[arg(long, default_value = ".")]
    src: PathBuf,

    /// Path to an optional TOML configuration file overriding the above.
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {path}"))?,
        None => Config::default(),
    };
    config.server.rtsp_port = cli.port;
    config.server.advertise_address = cli.address.clone();
    config.server.src_dir = cli.src.to_string_lossy().to_string();

    info!(
        port = config.server.rtsp_port,
        address = %config.server.advertise_address,
        src = %config.server.src_dir,
        "starting rtsp-mjpeg-server"
    );

    let listen_addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.rtsp_port)
        .parse()
        .with_context(|| "invalid bind address/port")?;

    let server_config = ServerConfig {
        listen_addr,
        advertise_address: config.server.advertise_address.clone(),
        src_dir: PathBuf::from(&config.server.src_dir),
        mtu: config.server.mtu,
        ssrc: config.server.ssrc,
        server_rtp_port: config.server.server_rtp_port,
        q: config.server.q,
        publisher_tick: Duration::from_millis(config.server.tick_millis),
    };

    let server = RtspServer::new(server_config);
    server.run().await.with_context(|| "rtsp server exited")?;

    Ok(())
}
