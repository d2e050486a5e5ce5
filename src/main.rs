mod cli;

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use glasscam::analysis::{HttpAnalysisClient, UnconfiguredClient, API_KEY_ENV};
use glasscam::config::Config;
use glasscam::{
    AnalysisClient, ClientError, Coordinator, DevicePlatform, SimulatedPlatform, SourceId,
};

use cli::{Args, Command};

/// Load .env file, install the logger and check for the API key.
///
/// Does not override existing environment variables.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if std::env::var(API_KEY_ENV).is_err() {
        log::warn!(
            "{} is not set; frame descriptions will be unavailable",
            API_KEY_ENV
        );
    }
}

fn build_platform(simulate: bool) -> Result<Arc<dyn DevicePlatform>, Box<dyn Error>> {
    if simulate {
        log::info!("Using simulated cameras");
        return Ok(Arc::new(SimulatedPlatform::demo()));
    }

    #[cfg(feature = "native")]
    {
        Ok(Arc::new(glasscam::platform::NativePlatform::new()))
    }

    #[cfg(not(feature = "native"))]
    {
        Err("glasscam was built without camera support.\n\
            Rebuild with `--features native` or pass --simulate."
            .into())
    }
}

/// Build the HTTP client, or a stand-in that fails every request when no
/// API key is configured.
fn build_client(config: &Config) -> Result<Arc<dyn AnalysisClient>, Box<dyn Error>> {
    let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
    match HttpAnalysisClient::with_base_url(api_key, config.analysis.base_url.clone()) {
        Ok(client) => Ok(Arc::new(client.model(config.analysis.model.clone()))),
        Err(ClientError::MissingApiKey) => {
            log::warn!(
                "Add {API_KEY_ENV}=your-api-key-here to a .env file to enable descriptions"
            );
            Ok(Arc::new(UnconfiguredClient))
        }
        Err(e) => Err(format!("Failed to create analysis client: {}", e).into()),
    }
}

fn build_coordinator(
    args: &Args,
    config: &Config,
    platform: Arc<dyn DevicePlatform>,
    instruction: Option<String>,
) -> Result<Coordinator, Box<dyn Error>> {
    let client = build_client(config)?;
    let mut settings = config.coordinator_settings();
    if let Some(source) = &args.source {
        settings.source = Some(SourceId::from(source.as_str()));
    }
    if args.mirror {
        settings.mirror = true;
    }
    if let Some(instruction) = instruction {
        settings.instruction = instruction;
    }
    Ok(Coordinator::new(platform, client, settings))
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    if let Some(Command::Config { action }) = &args.command {
        return cli::handle_config_action(action, args.config.as_deref());
    }

    let config = Config::load(args.config.as_deref())?;
    let platform = build_platform(args.simulate)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        match &args.command {
            Some(Command::ListSources) => cli::list_sources(platform).await,
            Some(Command::Describe { instruction }) => {
                let coordinator =
                    build_coordinator(&args, &config, platform, instruction.clone())?;
                cli::describe(coordinator).await
            }
            Some(Command::Run) | None => {
                let coordinator = build_coordinator(&args, &config, platform, None)?;
                cli::run(coordinator).await
            }
            Some(Command::Config { .. }) => Ok(()),
        }
    })
}

fn main() {
    load_env();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
