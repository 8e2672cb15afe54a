use anyhow::Result;
use architect_broker::{ActionStore, BrokerConfig, PendingAction};
use colored::Colorize;

pub async fn execute(config: BrokerConfig, all: bool) -> Result<()> {
    let store = ActionStore::open(&config.store.database_url).await?;
    let actions = if all {
        store.all().await?
    } else {
        store.unsynced().await?
    };
    let counts = store.counts().await?;
    store.close().await;

    println!(
        "{} ({} unsynced, {} synced)",
        "Queued actions".green().bold(),
        counts.unsynced,
        counts.synced
    );
    println!();

    if actions.is_empty() {
        println!("{}", "Queue is empty".dimmed());
        return Ok(());
    }

    for action in &actions {
        print_action(action);
    }

    Ok(())
}

fn print_action(action: &PendingAction) {
    let status = if action.synced {
        "synced".green()
    } else {
        "pending".yellow()
    };

    println!(
        "  #{:<5} {:<7} {:<8} {}  {}",
        action.id,
        action.method.bold(),
        status,
        action.url,
        action.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
    );
}
