//! `fixpoint prune` - evict and consolidate memory records

use colored::Colorize;
use fixpoint_core::pruning::{MemoryPruner, PruningConfig, PruningStrategy};

pub fn run(
    strategy: String,
    dry_run: bool,
    namespace: Option<String>,
    aggressive: bool,
) -> anyhow::Result<()> {
    let strategy = PruningStrategy::parse_name(&strategy);

    println!("{}", "Memory pruning".cyan().bold());
    println!("strategy: {strategy}");
    println!("mode: {}", if dry_run { "dry run (preview only)" } else { "live" });
    match &namespace {
        Some(namespace) => println!("target namespace: {namespace}"),
        None => println!("target: all namespaces"),
    }
    if aggressive {
        println!("aggressive compression of over-represented patterns: enabled");
    }

    let memory = super::open_store()?;
    let config = PruningConfig {
        aggressive,
        dry_run,
        ..PruningConfig::default()
    };
    let pruner = MemoryPruner::new(&memory, config);

    match namespace {
        Some(namespace) => {
            let outcome = pruner.prune_namespace(&namespace, strategy)?;
            println!();
            println!("{} {namespace}", "pruned namespace".green().bold());
            println!("  removed: {}", outcome.memories_removed);
            println!("  consolidated: {}", outcome.memories_consolidated);
            println!("  {} -> {}", outcome.initial_count, outcome.final_count);
        }
        None => {
            let result = pruner.prune_all(strategy)?;
            println!();
            println!("{}", "pruning complete".green().bold());
            println!("  removed: {}", result.memories_removed);
            println!("  consolidated: {}", result.memories_consolidated);
            println!(
                "  {} -> {} memories",
                result.total_memories_before, result.total_memories_after
            );
            println!("  space saved: {:.2} MB", result.space_saved_mb);
            println!("  time: {:.2}s", result.pruning_time_seconds);

            let mut namespaces: Vec<_> = result.namespace_results.iter().collect();
            namespaces.sort_by_key(|(name, _)| name.as_str().to_owned());
            for (name, outcome) in namespaces {
                if outcome.memories_removed > 0 || outcome.memories_consolidated > 0 {
                    println!(
                        "  {name}: -{}, consolidated {}",
                        outcome.memories_removed, outcome.memories_consolidated
                    );
                }
            }
        }
    }

    Ok(())
}
