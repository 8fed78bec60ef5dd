//! `kgagent chat`: Interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use kgagent_agent::{Agent, Collaborators, TurnReport};
use kgagent_config::AppConfig;
use kgagent_core::graph::KnowledgeGraph;
use kgagent_core::persona::Persona;
use kgagent_memory::{AgentStores, InMemoryGraph};
use kgagent_providers::{ChatSearchBackend, HttpKnowledgeGraph, OpenAiCompatProvider};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

pub async fn run(message: Option<String>, show_entities: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Missing keys fail here with setup instructions
    if config.completion.api_key.is_none() {
        eprintln!();
        eprintln!("  ERROR: No completion API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    KGAGENT_API_KEY=sk-...   (generic)");
        eprintln!("    OPENAI_API_KEY=sk-...    (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }
    if config.search.api_key.is_none() {
        return Err("No search API key found. Set PERPLEXITY_API_KEY or [search].api_key.".into());
    }

    let mut agent = build_agent(&config)?;

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let result = agent.respond(&msg).await;
        eprint!("\r              \r");
        let report = result?;
        print_report(&report, show_entities);
        agent.persist()?;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  kgagent: Interactive Mode");
    println!();
    println!("  Agent:     {}", agent.name());
    println!("  Model:     {}", config.completion.model);
    println!(
        "  Graph:     {}",
        config.graph.url.as_deref().unwrap_or("in-memory")
    );
    println!("  History:   {} turns loaded", agent.stores().history.len());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&line) {
            break;
        }

        eprint!("  ...");
        let result = agent.respond(line).await;
        eprint!("\r     \r");
        match result {
            Ok(report) => {
                println!();
                print_report(&report, show_entities);
                println!();
                if config.memory.auto_save
                    && let Err(e) = agent.persist()
                {
                    eprintln!("  [Save Error] {e}");
                }
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    agent.persist()?;
    info!(agent = %agent.name(), "Session saved");

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

/// Wire configured backends, persona and persisted stores into an agent.
pub fn build_agent(config: &AppConfig) -> Result<Agent, Box<dyn std::error::Error>> {
    let persona = Persona::load(&config.agent.name, &config.persona_paths());
    let stores = AgentStores::load(&config.agent_data_dir())?;

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.completion)?);
    let search = Arc::new(ChatSearchBackend::from_config(&config.search)?);
    let graph: Arc<dyn KnowledgeGraph> = match &config.graph.url {
        Some(_) => Arc::new(HttpKnowledgeGraph::from_config(&config.graph)?),
        None => {
            warn!("No graph URL configured, using an in-memory graph for this session");
            Arc::new(InMemoryGraph::new())
        }
    };

    Ok(Agent::new(
        config,
        persona,
        stores,
        Collaborators {
            provider,
            search,
            graph,
        },
    ))
}

fn print_report(report: &TurnReport, show_entities: bool) {
    for line in report.answer.lines() {
        println!("  Assistant > {line}");
    }
    if show_entities && !report.entities.is_empty() {
        let entities: Vec<&str> = report.entities.iter().map(String::as_str).collect();
        println!("  Entities  > {}", entities.join(", "));
    }
    if let Some(err) = &report.write_back_error {
        eprintln!("  [Write-back skipped] {err}");
    }
}
