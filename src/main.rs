use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use medisync::api::server::start_api_server;
use medisync::api::types::ApiContext;
use medisync::config;
use medisync::poller::{start_reminder_poller, DEFAULT_POLL_INTERVAL_SECS};
use medisync::trackers::DueReminder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let data_dir = config::app_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let db_path = config::database_path();

    // Open once at startup so migrations run before anything else
    medisync::db::sqlite::open_database(&db_path)?;

    let mut ctx = ApiContext::new(db_path.clone());
    ctx.policy = config::finalize_policy();
    seed_sessions(&ctx)?;

    // Due-reminder poller feeding the notification dispatcher
    let (dispatch_tx, mut dispatch_rx) = mpsc::channel::<DueReminder>(64);
    let _poller = start_reminder_poller(
        db_path,
        Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        dispatch_tx,
    );
    tokio::spawn(async move {
        while let Some(due) = dispatch_rx.recv().await {
            // Notification delivery channel goes here; for now the
            // dispatch is logged.
            tracing::info!(
                patient = %due.patient_id,
                medication = %due.medication_name,
                dosage = %due.dosage,
                scheduled = %due.scheduled_time,
                "Dose due"
            );
        }
    });

    let addr = config::listen_addr();
    let mut server = start_api_server(ctx, addr)
        .await
        .map_err(std::io::Error::other)?;
    tracing::info!("{} server running on {}", config::APP_NAME, server.addr);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    server.shutdown();

    Ok(())
}

/// Seed bearer sessions from `MEDISYNC_SESSIONS`.
fn seed_sessions(ctx: &ApiContext) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::env::var("MEDISYNC_SESSIONS").unwrap_or_default();
    let seeded = config::seeded_sessions(&raw);
    let mut sessions = ctx
        .sessions
        .lock()
        .map_err(|_| std::io::Error::other("session lock poisoned"))?;
    for (token, user_id, role) in seeded {
        sessions.insert(&token, &user_id, role);
    }
    if sessions.is_empty() {
        tracing::warn!("No sessions seeded; all API requests will be rejected");
    } else {
        tracing::info!(count = sessions.len(), "Seeded API sessions");
    }
    Ok(())
}
