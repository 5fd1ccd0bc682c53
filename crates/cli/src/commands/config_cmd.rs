//! `wayfarer config`: configuration management commands.

use std::path::Path;

use wayfarer_config::AppConfig;
use wayfarer_memory::MemoryService;

use super::load_config;

pub async fn validate(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match load_config(config) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e);
        }
    };
    println!("   ✅ Config parsed successfully");

    if let Err(e) = MemoryService::new(&config) {
        println!("   ❌ Builder registry: {e}");
        return Err(e.into());
    }
    println!("   ✅ Builder registry matches memory agents");

    let mut warnings = Vec::new();
    let root = &config.memory.storage_root;
    if root.exists() && !root.is_dir() {
        warnings.push(format!("Storage root {} is not a directory", root.display()));
    }
    if config.memory.size_warn_bytes == 0 {
        warnings.push("memory.size_warn_bytes = 0 warns on every write".to_string());
    }
    if let Some((agent, tokens)) = config
        .budget
        .output_tokens
        .iter()
        .find(|(_, tokens)| **tokens >= config.budget.input_tokens)
    {
        warnings.push(format!(
            "Output reserve for {agent} ({tokens}) leaves no room for memory"
        ));
    }

    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Storage:   {}", root.display());
    println!("   Agents:    {}", config.memory.agents.join(", "));
    println!("   Notes:     {}", config.memory.notes_agents.join(", "));
    println!(
        "   Caps:      {} pinned, {} ephemeral, {} shared",
        config.memory.max_pinned, config.memory.max_ephemeral, config.memory.max_shared
    );
    println!("   Budget:    {} input tokens", config.budget.input_tokens);

    Ok(())
}

pub async fn show(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}
