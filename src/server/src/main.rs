use anyhow::Result;
use common::config::{self, Config};
use devices::{Engine, EngineConf};
use history::HistoryStore;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_owned());
    let config = Config::load(&config_path);

    tokio::fs::create_dir_all(&config.data_dir).await?;
    if let Some(dir) = config.device_file.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let devices = config::load_devices(&config.device_file).await?;
    let history = HistoryStore::new(&config.data_dir, config.history_hours);

    let mut engine = Engine::new(EngineConf::from(&config), devices, history);
    engine.start().await;
    info!("acquisition running, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    engine.stop().await;
    Ok(())
}
