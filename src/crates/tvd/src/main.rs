//! tvd: control-plane daemon entry point.
//!
//! Reads the device inventory from the config file, builds a driver per
//! configured set, and serves the HTTP adapter until interrupted.
//!
//! ```text
//! tvd [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Configuration file [default: tvd.toml] [env: TVD_CONFIG]
//!   --listen <ADDR>   Override the HTTP listen address      [env: TVD_LISTEN]
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tvd::config::{self, TvEntry};
use tvd::driver::{self, Tv};
use tvd::http::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "tvd", about = "Control plane for LG and Sony Bravia televisions")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "tvd.toml", env = "TVD_CONFIG")]
    config: PathBuf,

    /// Override the HTTP listen address from the config file.
    #[arg(long, env = "TVD_LISTEN")]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.daemon.log_level.clone())),
        )
        .init();

    info!("tvd starting");

    let mut tvs: HashMap<String, Arc<dyn Tv>> = HashMap::new();
    for entry in &config.tvs {
        match build_driver(entry).await {
            Ok(tv) => {
                info!(name = %entry.name, model = %entry.model, "driver ready");
                tvs.insert(entry.name.clone(), tv);
            }
            Err(e) => error!(name = %entry.name, "skipping device: {e}"),
        }
    }

    let listen = cli.listen.unwrap_or(config.daemon.listen);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("listening on {listen}");

    let state = Arc::new(AppState { tvs });
    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    info!("tvd stopped");
    Ok(())
}

/// Opens the entry's transport (if it names one) and asks the registry for
/// a driver.
async fn build_driver(entry: &TvEntry) -> anyhow::Result<Arc<dyn Tv>> {
    let transport = match (&entry.device, &entry.tcp) {
        (Some(path), _) => Some(driver::open_serial(path, entry.baud)?),
        (None, Some(addr)) => Some(driver::open_tcp(addr).await?),
        (None, None) => None,
    };
    let model_config = toml::Value::Table(entry.model_config.clone());
    let tv = driver::registry().new_driver(&entry.model, transport, &model_config)?;
    Ok(Arc::from(tv))
}
