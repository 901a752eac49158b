use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use herald::{
    config::{AppConfig, ConfigLoader},
    engine::rhai::RhaiCompiler,
    metrics::register_metrics,
    models::NotificationsSettings,
    settings::EngineConfigBuilder,
    supervisor::Supervisor,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Directory holding `app.yaml`, `notifications.yaml` and the resources.
    #[arg(long, default_value = "configs")]
    config_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the notification controller.
    Run(ConfigArgs),
    /// Validates the notification settings and exits.
    Check(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_supervisor(args).await?,
        Commands::Check(args) => check_settings(args)?,
    }

    Ok(())
}

fn load_config(args: &ConfigArgs) -> Result<AppConfig, Box<dyn std::error::Error>> {
    tracing::debug!(config_dir = %args.config_dir.display(), "Loading application configuration...");
    let config = AppConfig::new(args.config_dir.to_str())?;
    tracing::debug!(
        workers = config.workers,
        resources_dir = %config.resources_dir.display(),
        settings = %config.notifications_config_path.display(),
        "Configuration loaded."
    );
    Ok(config)
}

async fn run_supervisor(args: ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    register_metrics();

    let supervisor = Supervisor::builder().config(config).build()?;
    tracing::info!("Supervisor initialized, watching resources...");

    supervisor.run().await?;

    Ok(())
}

fn check_settings(args: ConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    let settings: NotificationsSettings =
        ConfigLoader::new(config.notifications_config_path.clone()).load()?;

    let engine_config = EngineConfigBuilder::new()
        .compiler(Arc::new(RhaiCompiler::new(config.rhai.clone())))
        .annotation_prefix(&config.annotation_prefix)
        .build(&settings)?;

    println!(
        "{}: {} triggers, {} templates, {} services, {} subscriptions",
        config.notifications_config_path.display(),
        engine_config.triggers.names().count(),
        engine_config.templates.names().count(),
        engine_config.services.names().count(),
        engine_config.subscriptions.len(),
    );
    Ok(())
}
