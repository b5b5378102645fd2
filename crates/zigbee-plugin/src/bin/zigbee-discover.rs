//! List serial ports that may hold a Zigbee controller

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zigbee_plugin::{discovery, PluginConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zigbee_plugin=debug,zigbee_core=debug,info".into()),
        )
        .init();

    let config = PluginConfig::from_env();
    tracing::info!("Network settings are kept in {}", config.data_dir.display());

    let descriptors = discovery::discover_controllers();
    if descriptors.is_empty() {
        tracing::warn!("No serial ports found");
    }
    println!("{}", serde_json::to_string_pretty(&descriptors)?);
    Ok(())
}
