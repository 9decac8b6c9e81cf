use log::{error, info, warn};
use service::{config::Config, logging::Logger, AppState};

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
        std::process::exit(1);
    }

    info!("Starting inbox relay [{}]...", config.runtime_env());

    if config.is_production() && config.webhook_secret().is_none() {
        warn!("WEBHOOK_SECRET is not set; /webhooks/events accepts unauthenticated events");
    }

    let app_state = AppState::new(config);

    if let Err(e) = web::init_server(app_state).await {
        error!("Server exited with error: {e}");
        std::process::exit(1);
    }

    info!("Inbox relay stopped");
}
