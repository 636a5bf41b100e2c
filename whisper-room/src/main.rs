use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use whisper_room::{
    broker,
    cli::{Cli, Command},
    client,
    room::Room,
    web,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Broker(args) => {
            let listener = TcpListener::bind(args.listen).await?;
            let broker = broker::Broker::new(listener);
            let addr = broker.local_addr()?;
            info!("broker listening on {}", addr);
            if let Err(err) = broker.run_until_ctrl_c().await {
                warn!("broker exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Web(args) => {
            let listener = TcpListener::bind(args.listen).await?;
            info!("web server listening on {}", listener.local_addr()?);
            let room = Arc::new(Room::new());
            web::serve(listener, room, shutdown_signal()).await?;
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
