use anyhow::{Context, Result};
use architect_broker::notify::{MemoryClients, MemoryNotifications};
use architect_broker::sync::replay_pending;
use architect_broker::{Broker, BrokerConfig, PeriodicReport, PeriodicTag, SyncTag};
use architect_server::open_host;
use colored::Colorize;
use std::sync::Arc;

/// One background-sync batch against the durable store
pub async fn execute(config: BrokerConfig, tag: &str) -> Result<()> {
    let tag: SyncTag = tag.parse()?;

    println!("{} {}", "Syncing".green().bold(), tag.to_string().cyan());
    println!();

    let host = open_host(
        &config,
        Arc::new(MemoryNotifications::new()),
        Arc::new(MemoryClients::new()),
    )
    .await?;

    let report = replay_pending(
        &host.store,
        host.upstream.as_ref(),
        tag,
        &config.api.prefix,
    )
    .await;

    if report.attempted == 0 {
        println!("{}", "Nothing to sync".dimmed());
    } else if report.failed() == 0 {
        println!(
            "{}",
            format!("  ✓ {}/{} actions synced", report.synced, report.attempted).green()
        );
    } else {
        println!(
            "{}",
            format!(
                "  ⚠ {}/{} actions synced, {} left for the next sync",
                report.synced,
                report.attempted,
                report.failed()
            )
            .yellow()
        );
    }

    host.store.close().await;
    Ok(())
}

/// One periodic task, run outside the proxy against the configured generation
pub async fn execute_periodic(config: BrokerConfig, tag: &str) -> Result<()> {
    let tag: PeriodicTag = tag.parse()?;

    println!("{} {}", "Running".green().bold(), tag.to_string().cyan());
    println!();

    let host = open_host(
        &config,
        Arc::new(MemoryNotifications::new()),
        Arc::new(MemoryClients::new()),
    )
    .await?;
    let store = host.store.clone();
    let broker = Broker::new(config, host).context("Invalid broker configuration")?;

    match broker.periodic_sync(tag).await {
        PeriodicReport::Reminders { notified: Some(notification) } => {
            println!("{}", "  ✓ Reminder due".green());
            println!("    {}", notification.title.bold());
            println!("    {}", notification.body);
            println!("    {}", notification.data.url.dimmed());
        }
        PeriodicReport::Reminders { notified: None } => {
            println!("{}", "No reminder due".dimmed());
        }
        PeriodicReport::ContentUpdated { refreshed, failed } => {
            println!(
                "  {} views refreshed in {}",
                refreshed.to_string().green(),
                broker.generation().label.cyan()
            );
            if failed > 0 {
                println!("{}", format!("  ⚠ {} views could not be fetched", failed).yellow());
            }
        }
    }

    store.close().await;
    Ok(())
}
