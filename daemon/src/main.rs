use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use mailroute::config::{Config, GmailConfig, LogFormat, LoggingConfig};
use mailroute::{
    AdminService, BatchFetcher, ConfigError, Database, GmailClient, IntakePipeline,
    IntakeScheduler, Mailbox, MailrouteError, RefreshTokenProvider, StaticToken, TokenProvider,
};

/// Polls the configured mailbox and forwards messages routed by subject.
///
/// Usage: `mailroute [CONFIG]`. Without an argument the config comes from
/// `MAILROUTE_CONFIG`, then `~/.mailroute/config.json`, then built-in
/// defaults. Environment overrides apply in every case.
#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_configuration() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mailroute: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("mailroute: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting mailroute v{}", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(arg) = std::env::args().nth(1).filter(|a| !a.starts_with('-')) {
        return Some(PathBuf::from(arg));
    }
    if let Some(path) = std::env::var_os("MAILROUTE_CONFIG").filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    mailroute::config::default_config_path().filter(|p| p.exists())
}

fn load_configuration() -> Result<Config, ConfigError> {
    match config_path() {
        Some(path) => mailroute::load_config(path),
        None => {
            let mut config = Config::default();
            mailroute::config::apply_env_overrides(&mut config)?;
            Ok(config)
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))?;

    tracing_log::LogTracer::init()?;

    match logging.format {
        LogFormat::Text => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_current_span(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

fn token_provider(gmail: &GmailConfig) -> Result<Arc<dyn TokenProvider>, MailrouteError> {
    if gmail.access_token.is_configured() {
        info!("Using a fixed access token");
        let token = gmail.access_token.resolve("Gmail access token")?;
        return Ok(Arc::new(StaticToken::new(token)));
    }

    let provider = RefreshTokenProvider::new(
        gmail.token_url.clone(),
        gmail.client_id.resolve("Gmail client id")?,
        gmail.client_secret.resolve("Gmail client secret")?,
        gmail.refresh_token.resolve("Gmail refresh token")?,
        &gmail.http_settings(),
    )?;
    Ok(Arc::new(provider))
}

fn install_shutdown_handler(shutdown: Arc<Notify>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || shutdown.notify_one())
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = config
        .database
        .resolved_path()
        .ok_or_else(|| ConfigError::Validation {
            message: "Cannot determine database path; set database.path".to_string(),
        })?;
    let db = Database::open(&db_path)?;

    if config.seed_defaults {
        AdminService::new(db.clone()).seed_defaults()?;
    }

    let tokens = token_provider(&config.gmail)?;
    let mailbox: Arc<dyn Mailbox> = Arc::new(GmailClient::new(
        config.gmail.api_base_url.clone(),
        tokens,
        &config.gmail.http_settings(),
    )?);

    let fetcher = BatchFetcher::new(Arc::clone(&mailbox))
        .with_concurrency(config.intake.concurrency)
        .with_page_delay(config.intake.page_delay());
    let pipeline = IntakePipeline::new(db, mailbox)
        .with_fetcher(fetcher)
        .with_template(config.forwarding.clone())
        .with_batch_limits(config.intake.batch_size, config.intake.max_batches);

    info!(
        "Checking {} every {}s",
        if config.gmail.user_email.is_empty() {
            "the authorized mailbox"
        } else {
            config.gmail.user_email.as_str()
        },
        config.intake.check_interval_secs
    );

    let shutdown = Arc::new(Notify::new());
    install_shutdown_handler(Arc::clone(&shutdown))
        .map_err(|e| format!("Failed to install Ctrl-C handler: {}", e))?;

    let scheduler = IntakeScheduler::new(Arc::new(pipeline), config.intake.check_interval())
        .with_run_on_start(true);
    let handle = scheduler.start();

    shutdown.notified().await;
    info!("Shutting down");
    scheduler.stop();
    if let Err(e) = handle.await {
        warn!("Scheduler task ended abnormally: {}", e);
    }

    Ok(())
}
