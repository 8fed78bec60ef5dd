//! `kgagent config`: Show the resolved configuration.

use kgagent_config::AppConfig;

pub fn run(default: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let threshold = config.context.eviction_threshold();

    println!("Config file:  {}", AppConfig::config_dir().join("config.toml").display());
    println!("Agent:        {}", config.agent.name);
    println!("Data dir:     {}", config.agent_data_dir().display());
    println!();
    println!("Completion:   {} @ {}", config.completion.model, config.completion.api_url);
    println!("  API key:    {}", key_status(&config.completion.api_key));
    println!("Search:       {} @ {}", config.search.model, config.search.api_url);
    println!("  API key:    {}", key_status(&config.search.api_key));
    println!(
        "Graph:        {}",
        config.graph.url.as_deref().unwrap_or("in-memory")
    );
    println!();
    println!(
        "Context:      {} tokens, evict above {} (keep last {})",
        config.context.context_length, threshold, config.context.noneviction_length
    );
    println!(
        "Retrieval:    max {} entities, write-back to {}",
        config.retrieval.max_entities,
        config.scratch_path().display()
    );
    println!("Auto-save:    {}", config.memory.auto_save);
    println!();
    println!("{config:#?}");

    Ok(())
}

fn key_status(key: &Option<String>) -> &'static str {
    if key.is_some() { "set" } else { "missing" }
}
