use std::path::PathBuf;

use clap::Parser;
use server::config::Settings;
use server::connection_manager::serve;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "propbet-server", version, about = "Peer-to-peer player prop wagers")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.logging.init();

    let services = server::start(&settings).await?;
    let listener = TcpListener::bind(&settings.listen_address).await?;
    info!(address = %settings.listen_address, "listening");

    tokio::select! {
        _ = serve(listener, services) => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
