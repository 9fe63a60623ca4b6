use clap::Parser;
use rtsp::{Server, ServerConfig};
use std::io;
use std::net::IpAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rtsp-streamer",
    about = "Single-session RTSP streaming engine"
)]
struct Args {
    /// IP address to listen on; also the media destination address
    #[arg(long, default_value = "0.0.0.0")]
    listen_ip: IpAddr,

    /// RTSP control port
    #[arg(long, short, default_value_t = 8554)]
    port: u16,

    /// Lowest local port handed to streamers
    #[arg(long, default_value_t = 5000)]
    port_min: u16,

    /// Highest local port handed to streamers
    #[arg(long, default_value_t = 5999)]
    port_max: u16,

    /// Stream-control worker threads
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Pending stream-control jobs before new ones are rejected
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen_ip: self.listen_ip,
            listen_port: self.port,
            port_range: self.port_min..=self.port_max,
            control_pool_size: self.workers,
            control_queue_capacity: self.queue_capacity,
            ..ServerConfig::default()
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if args.port_min > args.port_max {
        tracing::error!(
            port_min = args.port_min,
            port_max = args.port_max,
            "--port-min must not exceed --port-max"
        );
        return;
    }

    let mut server = Server::new(args.into_config());

    if let Err(e) = server.start() {
        tracing::error!(error = %e, "failed to start server");
        return;
    }

    match server.local_addr() {
        Ok(addr) => tracing::info!(%addr, "RTSP unit ready, press Enter to stop"),
        Err(e) => tracing::warn!(error = %e, "server address unavailable"),
    }
    let mut input = String::new();
    if let Err(e) = io::stdin().read_line(&mut input) {
        tracing::warn!(error = %e, "failed to read stdin");
    }

    server.stop();
    tracing::info!("server stopped");
}
