//! `wayfarer build|persist|append|notes|shared|stats|cleanup|sweep`: memory commands.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use tracing::debug;
use wayfarer_core::{AgentKind, EntityKey, StateSnapshot};
use wayfarer_memory::{MemoryService, WriteOutcome};

use super::load_config;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

fn open_service(config: Option<&Path>) -> Result<MemoryService, Box<dyn std::error::Error>> {
    let config = load_config(config)?;
    let service = MemoryService::new(&config)?;
    debug!(root = %service.store().root().display(), "Opened memory store");
    Ok(service)
}

/// Decode a snapshot file leniently; no file means an empty snapshot.
fn load_snapshot(
    service: &MemoryService,
    path: Option<&Path>,
) -> Result<StateSnapshot, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(StateSnapshot::default());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read snapshot {}: {e}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| format!("Snapshot {} is not valid JSON: {e}", path.display()))?;
    Ok(service.decode_snapshot(&value))
}

fn describe(outcome: WriteOutcome) -> String {
    match outcome {
        WriteOutcome::Unchanged => "unchanged".into(),
        WriteOutcome::Written { bytes } => format!("written ({bytes} bytes)"),
        WriteOutcome::Skipped => "skipped".into(),
    }
}

pub async fn build(
    config: Option<&Path>,
    trip_id: &str,
    agent: AgentKind,
    snapshot: Option<&Path>,
    budget: Option<usize>,
    prompt: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let snapshot = load_snapshot(&service, snapshot)?;
    EntityKey::new(trip_id, agent)?;

    if let Some(prompt) = prompt {
        let base = std::fs::read_to_string(prompt)?;
        println!("{}", service.build_prompt(trip_id, agent, &snapshot, base.trim_end()));
        return Ok(());
    }

    let content = service.build_content(trip_id, agent, &snapshot);
    if content.is_empty() {
        eprintln!("⚠️  {agent} has no memory document");
        return Ok(());
    }

    match budget {
        Some(budget) => {
            let report = service.budgeter().fit_report(agent, &content, budget);
            print!("{}", report.text);
            if report.truncated() {
                eprintln!();
                eprintln!(
                    "✂️  {} → {} tokens (budget {budget})",
                    report.original_tokens, report.fitted_tokens
                );
                if !report.shortened_zones.is_empty() {
                    eprintln!("   Shortened: {}", report.shortened_zones.join(", "));
                }
                if !report.dropped_zones.is_empty() {
                    eprintln!("   Dropped:   {}", report.dropped_zones.join(", "));
                }
                if report.dropped_notes > 0 {
                    eprintln!("   Notes dropped: {}", report.dropped_notes);
                }
            }
        }
        None => print!("{content}"),
    }
    Ok(())
}

pub async fn persist(
    config: Option<&Path>,
    trip_id: &str,
    agents: &[AgentKind],
    snapshot: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let snapshot = load_snapshot(&service, snapshot)?;
    let agents: Vec<AgentKind> = if agents.is_empty() {
        service.builder().agents().collect()
    } else {
        agents.to_vec()
    };

    println!("💾 Persisting memory for trip {trip_id}");
    for agent in agents {
        let key = EntityKey::new(trip_id, agent)?;
        let outcome = service.build_and_persist(&key, &snapshot).await?;
        println!("  {:<12} {}", agent.name(), describe(outcome));
    }
    Ok(())
}

pub async fn append(
    config: Option<&Path>,
    trip_id: &str,
    agent: AgentKind,
    file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let key = EntityKey::new(trip_id, agent)?;

    let input = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let report = service.append_notes(&key, &[input]).await?;
    println!("📝 Notes for {key}");
    println!("  Accepted: {}", report.accepted);
    println!("  Ignored:  {}", report.ignored);
    if !report.evicted.is_empty() {
        println!(
            "  Evicted:  {} pinned, {} ephemeral",
            report.evicted.pinned, report.evicted.ephemeral
        );
    }
    println!("  Document: {}", describe(report.outcome));
    Ok(())
}

pub async fn notes(
    config: Option<&Path>,
    trip_id: &str,
    agent: AgentKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let key = EntityKey::new(trip_id, agent)?;
    let notes = service.read_notes(&key);

    println!("📌 Pinned ({})", notes.pinned.len());
    for line in &notes.pinned {
        println!("  {}", line.render());
    }
    println!("🗒️  Ephemeral ({})", notes.ephemeral.len());
    for line in &notes.ephemeral {
        println!("  {}", line.render());
    }
    Ok(())
}

pub async fn shared(
    config: Option<&Path>,
    trip_id: &str,
    agent: AgentKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    EntityKey::new(trip_id, agent)?;
    let insights = service.read_shared(trip_id, agent);
    if insights.is_empty() {
        println!("   No shared insights for {agent} in trip {trip_id}.");
        return Ok(());
    }
    println!("🔗 Shared insights visible to {agent}");
    for insight in insights {
        println!("  {}", insight.render());
    }
    Ok(())
}

pub async fn stats(
    config: Option<&Path>,
    trip_id: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let stats = service.stats(trip_id);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("🧠 Memory Statistics — trip {trip_id}");
    println!("====================");
    println!("  Root:      {}", service.store().root().display());
    if stats.is_empty() {
        println!("  (no documents stored)");
        return Ok(());
    }
    for entry in &stats {
        println!(
            "  {:<12} {:>8.1} KB  ~{:>6} tokens  notes: {}",
            entry.agent.name(),
            entry.size_bytes as f64 / 1024.0,
            entry.estimated_tokens,
            if entry.has_notes { "yes" } else { "no" }
        );
    }
    let total: usize = stats.iter().map(|s| s.estimated_tokens).sum();
    println!("  Total:     ~{total} tokens across {} documents", stats.len());
    Ok(())
}

pub async fn cleanup(
    config: Option<&Path>,
    trip_id: &str,
    confirm: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !confirm {
        println!("⚠️  This will delete ALL memory documents of trip {trip_id} permanently.");
        println!("   Run with --confirm to proceed:");
        println!("   wayfarer cleanup {trip_id} --confirm");
        return Ok(());
    }

    let service = open_service(config)?;
    if service.cleanup_trip(trip_id).await? {
        println!("🗑️  Deleted memory for trip {trip_id}.");
    } else {
        println!("   No memory stored for trip {trip_id}.");
    }
    Ok(())
}

pub async fn sweep(
    config: Option<&Path>,
    max_age_days: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let removed = match max_age_days {
        Some(days) => {
            service
                .sweep_older_than(Duration::from_secs(u64::from(days) * SECS_PER_DAY))
                .await?
        }
        None => service.sweep_stale().await?,
    };

    if removed.is_empty() {
        println!("✅ No stale trips.");
    } else {
        println!("🧹 Removed {} stale trips: {}", removed.len(), removed.join(", "));
    }
    Ok(())
}
