//! TCP Broadcast Relay - Entry Point
//!
//! `broadcast_relay server` runs the relay, `broadcast_relay client` joins it
//! from the terminal. Both stop on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::BufReader;
use tokio::time::timeout;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use broadcast_relay::{Client, Console, RelayConfig, RelayError, Server, SHUTDOWN_GRACE};

/// Blocking stdin reads left behind at exit are abandoned after this long
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Which side of the relay to run
    #[arg(value_enum)]
    mode: Mode,

    /// JSON file with `host`, `port` and `buffer_size`
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (server) or dial (client)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (server) or dial (client)
    #[arg(long)]
    port: Option<u16>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Server,
    Client,
}

impl Cli {
    fn relay_config(&self) -> Result<RelayConfig, RelayError> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_file(path)?,
            None => RelayConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

fn init_tracing(mode: Mode) {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=broadcast_relay=trace
    let default = match mode {
        Mode::Server => "broadcast_relay=info",
        Mode::Client => "broadcast_relay=warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Client logs go to stderr so they stay out of the chat view
    match mode {
        Mode::Server => tracing_subscriber::fmt().with_env_filter(filter).init(),
        Mode::Client => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.mode);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start the runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result: Result<(), RelayError> = runtime.block_on(async {
        let config = cli.relay_config()?;
        match cli.mode {
            Mode::Server => run_server(config).await,
            Mode::Client => run_client(config).await,
        }
    });

    // The stdin reader may still be parked in a blocking read
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let side = match cli.mode {
                Mode::Server => "server",
                Mode::Client => "client",
            };
            println!("failed to start the {side}: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: RelayConfig) -> Result<(), RelayError> {
    let server = Server::bind(&config).await?;
    let handle = server.handle();

    let mut accept_loop = tokio::spawn(server.run());

    // An accept failure ends the run just like a signal, but is reported
    let ended = tokio::select! {
        joined = &mut accept_loop => Some(joined),
        _ = wait_for_shutdown_signal() => None,
    };

    if timeout(SHUTDOWN_GRACE, handle.stop()).await.is_err() {
        warn!("server stop did not finish within {:?}", SHUTDOWN_GRACE);
    }

    match ended {
        Some(Ok(result)) => result,
        Some(Err(e)) => Err(RelayError::Io(std::io::Error::other(e))),
        None => {
            let _ = timeout(SHUTDOWN_GRACE, accept_loop).await;
            Ok(())
        }
    }
}

async fn run_client(config: RelayConfig) -> Result<(), RelayError> {
    let input = BufReader::new(tokio::io::stdin());
    let (client, conn_status) = Client::connect(&config, input, Console::stdout()).await?;

    tokio::select! {
        _ = conn_status => {
            info!("relay closed the connection");
        }
        _ = wait_for_shutdown_signal() => {}
    }

    if timeout(SHUTDOWN_GRACE, client.stop()).await.is_err() {
        warn!("client stop did not finish within {:?}", SHUTDOWN_GRACE);
    }

    Ok(())
}

/// Resolve on SIGINT or SIGTERM (Ctrl+C elsewhere)
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                warn!("failed to register signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {}", e);
        }
    }
}
