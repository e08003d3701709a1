//! `fixpoint cycle` - improvement-cycle tracking operations

use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;
use fixpoint_core::analysis::CycleTracker;

pub fn run(
    command: String,
    issues_file: Option<PathBuf>,
    previous_issues_file: Option<PathBuf>,
    project_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("{}", "Improvement cycle tracking".cyan().bold());

    let memory = super::open_store()?;
    let tracker = CycleTracker::new(&memory);

    match command.as_str() {
        "manual_fixes" => {
            let (issues_file, project) = require_scan_inputs(issues_file, project_path)?;
            let previous_file = previous_issues_file
                .context("--previous-issues-file is required for manual_fixes")?;

            let previous = super::load_issues(&previous_file)?;
            let current = super::load_issues(&issues_file)?;
            let manual = tracker
                .detect_manual_fixes(&previous, &current, &project.display().to_string())
                .context("detecting manual fixes")?;

            println!("manual fixes detected: {}", manual.len());
            for fix in &manual {
                println!("  {} in {} ({})", fix.issue_type, fix.file_path, fix.context);
            }
        }

        "scan_comparison" => {
            let (issues_file, project) = require_scan_inputs(issues_file, project_path)?;
            let previous_file = previous_issues_file
                .context("--previous-issues-file is required for scan_comparison")?;

            let previous = super::load_issues(&previous_file)?;
            let current = super::load_issues(&issues_file)?;
            let comparison = tracker
                .compare_scans(&previous, &current, &project.display().to_string())
                .context("comparing scans")?;

            println!("previous issues: {}", comparison.previous_issues_count);
            println!("current issues: {}", comparison.current_issues_count);
            println!("total resolved: {}", comparison.total_resolved);
            println!("manual fixes: {}", comparison.manual_fixes_detected);
            println!("automated fixes: {}", comparison.automated_fixes_estimated);
            println!("manual fix rate: {:.1}%", comparison.manual_fix_rate * 100.0);
            println!(
                "automated fix rate: {:.1}%",
                comparison.automated_fix_rate * 100.0
            );

            if !comparison.manual_fix_types_breakdown.is_empty() {
                println!();
                println!("{}", "manual fix types".bold());
                let mut breakdown: Vec<_> =
                    comparison.manual_fix_types_breakdown.iter().collect();
                breakdown.sort_by(|a, b| b.1.cmp(a.1));
                for (issue_type, count) in breakdown {
                    println!("  {issue_type}: {count}");
                }
            }
        }

        "patterns" => {
            let patterns = tracker.manual_fix_patterns().context("analyzing patterns")?;

            println!("total manual fixes: {}", patterns.total_manual_fixes);
            if patterns.total_manual_fixes == 0 {
                println!("no manual fixes recorded yet; run scan comparisons first");
                return Ok(());
            }

            println!();
            println!("{}", "issue types fixed by hand".bold());
            let mut types: Vec<_> = patterns.issue_types.iter().collect();
            types.sort_by(|a, b| b.1.count.cmp(&a.1.count));
            for (issue_type, stats) in types {
                println!(
                    "  {issue_type}: {} fixes (contexts: {})",
                    stats.count,
                    stats.contexts.join(", ")
                );
            }

            if !patterns.automation_opportunities.is_empty() {
                println!();
                println!("{}", "automation opportunities".bold());
                for opportunity in &patterns.automation_opportunities {
                    println!(
                        "  {} ({} occurrences): {}",
                        opportunity.issue_type, opportunity.frequency, opportunity.recommendation
                    );
                }
            }
        }

        "cycle_metrics" => {
            let metrics = tracker.cycle_metrics().context("computing cycle metrics")?;
            println!("total cycles: {}", metrics.total_cycles);
            println!("completed: {}", metrics.completed_cycles);
            println!("success rate: {:.1}%", metrics.success_rate * 100.0);
            println!(
                "fix application rate: {:.1}%",
                metrics.fix_application_rate * 100.0
            );
        }

        other => bail!(
            "unknown cycle command {other:?}; expected manual_fixes, scan_comparison, patterns, \
             or cycle_metrics"
        ),
    }

    Ok(())
}

fn require_scan_inputs(
    issues_file: Option<PathBuf>,
    project_path: Option<PathBuf>,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    let issues_file = issues_file.context("--issues-file is required for this operation")?;
    let project_path = project_path.context("--project-path is required for this operation")?;
    Ok((issues_file, project_path))
}
