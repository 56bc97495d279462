use anyhow::Context;
use consult_gateway::{config::GatewayConfig, init_gateway, observability::init_tracing};
use std::env;
use std::path::Path;
use std::process;

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

fn load_config() -> anyhow::Result<GatewayConfig> {
    // An explicit path must exist; the default one is optional and env vars fill in the rest
    let config = match env::args().nth(1) {
        Some(path) => GatewayConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            GatewayConfig::from_file(DEFAULT_CONFIG_PATH).with_context(|| {
                format!("Failed to load configuration from {}", DEFAULT_CONFIG_PATH)
            })?
        }
        None => GatewayConfig::from_env()
            .context("Failed to load configuration from CONSULT_GATEWAY__* environment")?,
    };

    Ok(config)
}

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{:#}", e);
            eprintln!("Usage: consult-gateway [config_file]");
            process::exit(1);
        }
    };

    init_tracing(&config.logging);

    if let Err(e) = init_gateway(config).await {
        tracing::error!(error = %e, "Gateway error");
        process::exit(1);
    }
}
