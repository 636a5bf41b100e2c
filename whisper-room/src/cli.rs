use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host the room over TCP with newline-delimited JSON events.
    Broker(BrokerArgs),
    /// Host the room over WebSocket at `/ws`.
    Web(WebArgs),
    /// Join a TCP-hosted room from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BrokerArgs {
    /// Socket address the broker should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct WebArgs {
    /// Socket address the HTTP server should bind to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Name to register with; at most 8 characters are kept.
    #[arg(long)]
    pub name: String,

    /// Address of the broker to connect to.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,
}
