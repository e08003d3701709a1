//! `fixpoint stats` - feedback and memory statistics

use std::collections::HashMap;

use colored::Colorize;
use fixpoint_core::memory::USER_FEEDBACK_NAMESPACE;

pub fn run(detailed: bool) -> anyhow::Result<()> {
    println!("{}", "False-positive detection statistics".cyan().bold());

    let memory = super::open_store()?;
    let feedback = memory.records(USER_FEEDBACK_NAMESPACE)?;

    if feedback.is_empty() {
        println!("no training feedback recorded yet");
        println!("run `fixpoint train --interactive --issues-file <file>` to start");
        return Ok(());
    }

    let false_positives = feedback
        .iter()
        .filter(|record| record.meta_bool("is_false_positive").unwrap_or(false))
        .count();
    let validated = feedback
        .iter()
        .filter(|record| record.meta_bool("user_validated").unwrap_or(false))
        .count();
    let fp_rate = false_positives as f64 / feedback.len() as f64;
    let learning_effectiveness = validated as f64 / feedback.len() as f64;

    println!("user feedbacks: {}", feedback.len());
    println!("false positives: {false_positives}");
    println!("false-positive rate: {:.1}%", fp_rate * 100.0);
    println!("learning effectiveness: {:.1}%", learning_effectiveness * 100.0);

    let health = memory.health();
    println!();
    println!(
        "memory store: {} ({} records, {} with vectors)",
        health.state, health.memory_count, health.vector_count
    );

    if detailed {
        let mut by_type: HashMap<&str, (usize, usize)> = HashMap::new();
        let mut by_context: HashMap<&str, (usize, usize)> = HashMap::new();

        for record in &feedback {
            let is_fp = record.meta_bool("is_false_positive").unwrap_or(false);
            let type_entry = by_type.entry(record.issue_type()).or_default();
            type_entry.0 += 1;
            if is_fp {
                type_entry.1 += 1;
            }
            let context = record.meta_str("context").unwrap_or("unknown");
            let context_entry = by_context.entry(context).or_default();
            context_entry.0 += 1;
            if is_fp {
                context_entry.1 += 1;
            }
        }

        println!();
        println!("{}", "by issue type".bold());
        let mut types: Vec<_> = by_type.into_iter().collect();
        types.sort_by(|a, b| b.1 .0.cmp(&a.1 .0));
        for (issue_type, (total, fps)) in types {
            println!(
                "  {issue_type}: {total} total, {fps} false positives ({:.0}%)",
                fps as f64 / total as f64 * 100.0
            );
        }

        println!();
        println!("{}", "by context".bold());
        let mut contexts: Vec<_> = by_context.into_iter().collect();
        contexts.sort_by(|a, b| b.1 .0.cmp(&a.1 .0));
        for (context, (total, fps)) in contexts {
            println!(
                "  {context}: {total} total, {fps} false positives ({:.0}%)",
                fps as f64 / total as f64 * 100.0
            );
        }

        println!();
        println!("{}", "namespaces".bold());
        for namespace in memory.list_namespaces()? {
            println!("  {namespace}: {} records", memory.count(&namespace)?);
        }
    }

    Ok(())
}
