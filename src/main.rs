use anyhow::Context;

use taginfo_stream::{Cli, ConfigManager, logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    logging::init(cli.verbosity())?;

    let config = ConfigManager::load(&cli).context("refusing to start")?;
    tracing::info!(
        tool = %config.exiftool.display(),
        address = %config.bind_address,
        "configuration resolved"
    );

    if let Err(err) = server::serve(config).await {
        tracing::error!(error = %err, "server stopped with an error");
        return Err(err.into());
    }

    tracing::info!("bye");
    Ok(())
}
