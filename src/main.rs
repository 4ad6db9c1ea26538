use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vigil::broadcast::WsBroadcaster;
use vigil::config::{AppConfig, new_shared_preferences};
use vigil::engine::MonitoringEngine;
use vigil::notifications::NotificationDispatcher;
use vigil::notifications::senders::smtp::SmtpEmailSender;
use vigil::notifications::senders::twilio::TwilioSmsSender;
use vigil::notifications::senders::{EmailSender, SmsSender};
use vigil::store::postgres::PgStore;

const BROADCAST_CAPACITY: usize = 256;

fn init_logging() {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily("logs", "vigil.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env().map_err(|e| {
        error!(error = %e, "Invalid configuration.");
        e
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to the database.");
            e
        })?;
    info!("Connected to the database.");

    let email: Option<Arc<dyn EmailSender>> = match &config.smtp {
        Some(smtp) => Some(Arc::new(SmtpEmailSender::new(smtp)?)),
        None => {
            warn!("SMTP is not configured, email notifications are disabled.");
            None
        }
    };
    let sms: Option<Arc<dyn SmsSender>> = match &config.twilio {
        Some(twilio) => Some(Arc::new(TwilioSmsSender::new(twilio.clone()))),
        None => {
            warn!("Twilio is not configured, SMS notifications are disabled.");
            None
        }
    };

    let preferences = new_shared_preferences(config.preferences.clone());
    let dispatcher = NotificationDispatcher::new(email, sms, Arc::clone(&preferences));
    let broadcaster = Arc::new(WsBroadcaster::new(BROADCAST_CAPACITY));

    let engine = Arc::new(MonitoringEngine::new(
        Arc::new(PgStore::new(pool)),
        broadcaster,
        dispatcher,
        preferences,
    ));

    engine.start_monitoring().await;
    info!(monitored = engine.monitored_count(), "Monitoring engine started.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping monitors.");
    engine.stop_monitoring();

    Ok(())
}
