use std::sync::Arc;

use anyhow::Result;
use drawio_host::bridge;
use drawio_host::config::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse configuration from command line and environment
    let (config, command) = Config::from_args_and_env()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    bridge::run(Arc::new(config), command).await
}
