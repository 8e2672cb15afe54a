use anyhow::Result;
use architect_broker::{open_storage, BrokerConfig};
use colored::Colorize;

pub async fn execute(config: BrokerConfig) -> Result<()> {
    let cache = open_storage(&config.cache.backend).await?;
    let generations = cache.generations().await?;

    println!(
        "{} ({} backend)",
        "Cache generations".green().bold(),
        cache.name()
    );
    println!();

    if generations.is_empty() {
        println!("{}", "No generations stored".dimmed());
        return Ok(());
    }

    for label in &generations {
        let entries = cache.len(label).await?;
        let marker = if *label == config.cache.generation {
            "*".green().bold()
        } else {
            " ".normal()
        };
        println!("  {} {:<30} {} entries", marker, label, entries);
    }

    Ok(())
}
