use push2live::config::{DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH, load_config};
use push2live::error::Push2LiveError;
use push2live::notify::CallbackNotifier;
use push2live::runner::ProcessRunner;
use push2live::{AppState, DeployConfig, api, logging};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config_path =
        std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match load_config(Path::new(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let _log_guard = match logging::setup_logging(config.server.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    info!("Using config at {:?}", config_path);
    if let Err(e) = serve(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(config: DeployConfig) -> Result<(), Push2LiveError> {
    for target in &config.targets {
        info!(
            "Target '{}' at {} (repository: {:?}, channel: {:?}, on push: {:?})",
            target.name,
            target.repo_path.display(),
            target.repository,
            target.channel_id,
            target.on_push
        );
    }

    let bind_address = config.server.bind_address.clone();
    let state = Arc::new(AppState::new(
        config,
        Arc::new(ProcessRunner),
        Arc::new(CallbackNotifier::default()),
    ));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on {}", bind_address);
    axum::serve(listener, app).await?;
    Ok(())
}
