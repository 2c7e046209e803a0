use std::process::ExitCode;
use std::sync::Arc;
use warden::logger::*;
use warden::server::*;
use warden::settings::*;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    logger.reload_from_config(&project_settings.log)?;

    let lifecycle_config = LifecycleConfig::try_from_settings(&project_settings)?;
    let server = Arc::new(Server::try_new(&project_settings).await?);

    let running = Orchestrator::new(lifecycle_config, server).start().await?;
    let outcome = running.run_until(shutdown_signal()).await?;
    match outcome {
        ShutdownOutcome::Clean => info!("Servers exited properly"),
        ShutdownOutcome::Forced => error!("Servers were forced to shut down"),
    }
    Ok(outcome.exit_code())
}
