//! `kgagent memory`: Inspect the agent's persisted stores.

use clap::ValueEnum;
use kgagent_config::AppConfig;
use kgagent_core::entity::EntityRecord;
use kgagent_core::message::TurnRecord;
use kgagent_memory::AgentStores;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Turn history
    History,
    /// Memory stream
    Stream,
    /// Entity knowledge store
    Entities,
}

pub fn run(kind: StoreKind, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let dir = config.agent_data_dir();
    let stores = AgentStores::load(&dir)?;

    println!("Agent:  {}", config.agent.name);
    println!("Dir:    {}", dir.display());
    println!();

    match kind {
        StoreKind::History => print_turns("Turn history", stores.history.all(), limit),
        StoreKind::Stream => print_turns("Memory stream", stores.memory.all(), limit),
        StoreKind::Entities => print_entities(stores.entities.all(), limit),
    }

    Ok(())
}

fn tail<T>(records: &[T], limit: Option<usize>) -> &[T] {
    match limit {
        Some(n) if n < records.len() => &records[records.len() - n..],
        _ => records,
    }
}

fn print_turns(title: &str, records: &[TurnRecord], limit: Option<usize>) {
    println!("{title} ({} records)", records.len());
    println!("{}", "=".repeat(title.len()));
    for record in tail(records, limit) {
        println!(
            "[{}] {:>9}: {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.role.as_str(),
            record.content
        );
    }
}

fn print_entities(records: &[EntityRecord], limit: Option<usize>) {
    println!("Entity store ({} records)", records.len());
    println!("============");
    for record in tail(records, limit) {
        println!(
            "[{}] {} ({})",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.entity_name,
            record.relation
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_limits_to_most_recent() {
        let records = [1, 2, 3, 4];
        assert_eq!(tail(&records, Some(2)), &[3, 4]);
        assert_eq!(tail(&records, Some(10)), &[1, 2, 3, 4]);
        assert_eq!(tail(&records, None), &[1, 2, 3, 4]);
    }
}
