use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use chatrelay::chat::{ChatLogRepository, ChatRouter, DbDirectory, GroupRegistry, HistoryPolicy};
use chatrelay::datetime::parse_timezone;
use chatrelay::web::WebServer;
use chatrelay::{Config, Database};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let mut config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = chatrelay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        chatrelay::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    info!("chatrelay - real-time chat relay");
    info!(
        "Server configured on {}:{}",
        config.server.host, config.server.port
    );

    let db = match Database::open(&config.database.path).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database {}: {e}", config.database.path);
            return ExitCode::FAILURE;
        }
    };

    let directory = Arc::new(DbDirectory::new(db.pool().clone()));
    let router = ChatRouter::new(
        Arc::new(GroupRegistry::new()),
        Arc::new(ChatLogRepository::new(db.pool().clone())),
        directory.clone(),
        directory,
    )
    .with_policy(HistoryPolicy::from_config(&config.history))
    .with_timezone(parse_timezone(&config.server.timezone))
    .with_queue_capacity(config.session.outbound_queue);

    let server = match WebServer::new(&config.server, &config.auth, Arc::new(router)) {
        Ok(server) => server,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
