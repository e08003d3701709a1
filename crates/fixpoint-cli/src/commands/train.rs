//! `fixpoint train` - record user feedback on detected issues

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;
use fixpoint_core::memory::{StoreInput, FALSE_POSITIVE_NAMESPACE, USER_FEEDBACK_NAMESPACE};
use fixpoint_core::storage::MemoryStore;
use fixpoint_core::Issue;
use serde::Deserialize;
use serde_json::json;

pub fn run(issues_file: PathBuf, interactive: bool, batch_file: Option<PathBuf>) -> anyhow::Result<()> {
    println!("{}", "Training mode: false-positive detection".cyan().bold());

    let issues = super::load_issues(&issues_file)?;
    let memory = super::open_store()?;

    if interactive {
        run_interactive(&issues, &memory)
    } else if let Some(batch_file) = batch_file {
        run_batch(&issues, &batch_file, &memory)
    } else {
        bail!("specify either --interactive or --batch-file");
    }
}

/// Record one labeled issue into the feedback namespaces
fn store_feedback(
    memory: &MemoryStore,
    issue: &Issue,
    is_false_positive: bool,
    reasoning: &str,
    confidence: f64,
) -> anyhow::Result<()> {
    let metadata = json!({
        "memory_type": "user_feedback",
        "issue_type": issue.issue_type,
        "severity": issue.severity.as_str(),
        "context": issue.context.as_str(),
        "file_path": issue.file_path,
        "is_false_positive": is_false_positive,
        "user_validated": true,
        "confidence": confidence,
        "reasoning": reasoning,
    });

    memory
        .store(
            StoreInput::new(
                USER_FEEDBACK_NAMESPACE,
                format!(
                    "{}: {} ({})",
                    if is_false_positive { "false positive" } else { "valid issue" },
                    issue.issue_type,
                    issue.description
                ),
            )
            .with_metadata(metadata.clone()),
        )
        .context("storing feedback")?;

    // False positives additionally feed the suppression patterns
    if is_false_positive {
        memory
            .store(
                StoreInput::new(
                    FALSE_POSITIVE_NAMESPACE,
                    format!("{} in {} context", issue.issue_type, issue.context),
                )
                .with_metadata(metadata),
            )
            .context("storing false-positive pattern")?;
    }

    Ok(())
}

fn run_interactive(issues: &[Issue], memory: &MemoryStore) -> anyhow::Result<()> {
    println!("{} issues to review", issues.len());
    println!("commands: (y)es = false positive, (n)o = valid issue, (s)kip, (q)uit");

    let mut trained = 0usize;
    let mut skipped = 0usize;

    for (index, issue) in issues.iter().enumerate() {
        println!();
        println!("issue {}/{}", index + 1, issues.len());
        println!("  type: {}", issue.issue_type);
        println!("  severity: {}", issue.severity);
        println!("  description: {}", issue.description);
        println!("  context: {}", issue.context);
        if let Some(suggestion) = &issue.suggestion {
            println!("  suggestion: {suggestion}");
        }

        loop {
            print!("is this a false positive? (y/n/s/q): ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).context("reading input")?;

            match line.trim().to_lowercase().as_str() {
                "q" => {
                    println!("training session ended: {trained} trained, {skipped} skipped");
                    return Ok(());
                }
                "s" => {
                    skipped += 1;
                    break;
                }
                answer @ ("y" | "n") => {
                    print!("brief reason (optional): ");
                    let _ = std::io::stdout().flush();
                    let mut reason = String::new();
                    std::io::stdin().read_line(&mut reason).context("reading input")?;
                    let reason = reason.trim();
                    let reason = if reason.is_empty() {
                        "user classification during training"
                    } else {
                        reason
                    };

                    store_feedback(memory, issue, answer == "y", reason, 1.0)?;
                    trained += 1;
                    println!(
                        "{} {}",
                        "learned:".green(),
                        if answer == "y" { "false positive" } else { "valid issue" }
                    );
                    break;
                }
                _ => println!("please answer y, n, s, or q"),
            }
        }
    }

    println!();
    println!("{} {trained} trained, {skipped} skipped", "training complete:".green().bold());
    Ok(())
}

/// A pre-labeled training example
#[derive(Debug, Deserialize)]
struct BatchLabel {
    /// Issue line number used for matching
    issue_id: Option<u32>,
    description: Option<String>,
    #[serde(default)]
    is_false_positive: bool,
    #[serde(default)]
    reasoning: Option<String>,
}

fn run_batch(issues: &[Issue], batch_file: &PathBuf, memory: &MemoryStore) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(batch_file)
        .with_context(|| format!("reading batch file {}", batch_file.display()))?;
    let labels: Vec<BatchLabel> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing batch file {}", batch_file.display()))?;

    println!("{} labeled examples", labels.len());

    let mut trained = 0usize;
    let mut unmatched = 0usize;

    for label in &labels {
        let matching = issues.iter().find(|issue| {
            label.issue_id.is_some_and(|id| issue.line == Some(id))
                || label
                    .description
                    .as_deref()
                    .is_some_and(|d| issue.description == d)
        });

        match matching {
            Some(issue) => {
                let reasoning = label.reasoning.as_deref().unwrap_or("batch training data");
                store_feedback(memory, issue, label.is_false_positive, reasoning, 0.9)?;
                trained += 1;
            }
            None => {
                tracing::warn!(
                    description = label.description.as_deref().unwrap_or("<none>"),
                    "no matching issue for batch label"
                );
                unmatched += 1;
            }
        }
    }

    println!(
        "{} {trained} trained, {unmatched} unmatched",
        "batch training complete:".green().bold()
    );
    Ok(())
}
