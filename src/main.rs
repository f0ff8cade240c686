//! CLI for PollBridge
//!
//! Runs the long-poll HTTP server in front of an embedded broker that
//! listens on the configured broker address(es).

use std::future::IntoFuture;
use std::sync::Arc;

use clap::Parser;
use pollbridge::broker::MemoryBroker;
use pollbridge::config::{Overrides, Settings, load_config};
use pollbridge::transport::{AppState, publish_router, router};
use pollbridge::utils::logging;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pollbridge", about = "Re-publishes a topic/channel as HTTP long-polling")]
struct Cli {
    /// HTTP server address, e.g. `:4152` or `127.0.0.1:4152`
    #[arg(long)]
    address: Option<String>,

    /// Broker node address; takes priority over the discovery address. Empty disables it.
    #[arg(long = "nsqd-tcp-address")]
    nsqd_tcp_address: Option<String>,

    /// Discovery service address, used when no broker node address is set
    #[arg(long = "lookupd-http-address")]
    lookupd_http_address: Option<String>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn into_overrides(self) -> Overrides {
        Overrides {
            address: self.address,
            nsqd: self.nsqd_tcp_address,
            lookupd: self.lookupd_http_address,
            log_level: self.log_level,
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match settings(cli) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    logging::init(&settings.log.level);

    if let Err(e) = run_server(settings).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

fn settings(cli: Cli) -> Result<Settings, config::ConfigError> {
    let mut settings = load_config()?;
    settings.apply(cli.into_overrides())?;
    Ok(settings)
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let broker = MemoryBroker::new();
    for addr in [&settings.broker.nsqd, &settings.broker.lookupd] {
        if !addr.is_empty() {
            broker.listen(addr);
        }
    }

    let endpoint = settings.broker.endpoint();
    match &endpoint {
        Some(endpoint) => info!(%endpoint, "long-poll subscriptions will connect"),
        None => warn!("no broker endpoint configured; long-poll requests will fail"),
    }

    let state = Arc::new(AppState::new(Arc::new(broker.clone()), endpoint));
    let app = router(state).merge(publish_router(broker));

    let listener = TcpListener::bind(settings.server.address()).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);

    tokio::select! {
        res = axum::serve(listener, app).into_future() => {
            res?;
            error!("HTTP server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}
