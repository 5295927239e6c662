use anyhow::Context;
use clap::Parser;
use docqa::{api, config, logging, processing};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;

/// Document question-answering HTTP server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to bind (overrides SERVER_HOST).
    #[arg(long)]
    host: Option<IpAddr>,
    /// Port to bind (overrides SERVER_PORT; defaults to the first free port in 8000-8099).
    #[arg(long)]
    port: Option<u16>,
    /// Env file to load instead of `.env`.
    #[arg(long, env = "DOCQA_ENV_FILE")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = config::init_config(args.env_file.as_deref())
        .context("Failed to load configuration")?;
    logging::init_tracing();
    config.log_summary();

    let service = processing::ProcessingService::new(config)
        .context("Failed to initialize processing service")?;
    let app = api::create_router(Arc::new(service), config);

    let host = match args.host {
        Some(host) => host,
        None => config
            .server_host
            .as_deref()
            .unwrap_or("0.0.0.0")
            .parse()
            .context("SERVER_HOST is not a valid IP address")?,
    };
    let (listener, port) = bind_listener(host, args.port.or(config.server_port))
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://{}:{}", host, port);
    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

async fn bind_listener(
    host: IpAddr,
    port: Option<u16>,
) -> Result<(TcpListener, u16), std::io::Error> {
    if let Some(port) = port {
        return TcpListener::bind((host, port))
            .await
            .map(|listener| (listener, port));
    }

    for port in PORT_RANGE {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!(
            "No available port found in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ),
    ))
}
