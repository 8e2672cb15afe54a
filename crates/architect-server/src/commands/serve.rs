use anyhow::{Context, Result};
use architect_broker::{BrokerConfig, BrokerEvent, Registration};
use architect_server::{open_host, router, AppState, SseClients, SseNotifications};
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Pending SSE messages per page before it counts as lagging
const EVENT_BUFFER: usize = 64;

pub async fn execute(config: BrokerConfig, port: Option<u16>) -> Result<()> {
    println!("{}", "Starting offline broker...".green().bold());
    println!();

    let origin = config.origin().context("Invalid upstream origin")?;
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let clients = Arc::new(SseClients::new(events.clone()));
    let notifications = Arc::new(SseNotifications::new(events));

    let host = open_host(&config, notifications, clients.clone()).await?;
    let registration = Arc::new(Registration::new(host));

    let addr = format!("{}:{}", config.server.host, port.unwrap_or(config.server.port));
    let label = config.cache.generation.clone();
    let assets = config.manifest.mandatory().len();

    println!("Upstream:   {}", origin.as_str().cyan());
    println!("Generation: {} ({} mandatory assets)", label.cyan(), assets);

    registration
        .dispatch(BrokerEvent::Install(Box::new(config)))
        .await
        .with_context(|| format!("Install of generation {} failed", label))?;

    if registration.active().await.is_some() {
        println!("{}", "  ✓ Generation installed and active".green());
    } else {
        println!(
            "{}",
            "  ⚠ Generation installed and waiting (POST /__broker/skip-waiting to activate)".yellow()
        );
    }

    let app = router(AppState {
        registration,
        origin,
        clients,
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    println!();
    println!("Broker running at {}", format!("http://{}", addr).cyan().bold());

    axum::serve(listener, app).await?;
    Ok(())
}
