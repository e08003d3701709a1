//! `fixpoint analyze` - run the engine over a project

use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use fixpoint_core::analysis::{EngineConfig, RecursiveEngine};
use fixpoint_core::{Issue, Severity};

pub struct AnalyzeArgs {
    pub project_path: PathBuf,
    pub output_file: Option<PathBuf>,
    pub max_depth: Option<usize>,
    pub batch_size: usize,
    pub verbose: bool,
    pub quick: bool,
}

/// Severities always worth showing without a flag
const ACTIONABLE: &[Severity] = &[Severity::Critical, Severity::High];

/// Issue types that pair with high severity for quick mode
const HIGH_IMPACT_TYPES: &[&str] = &[
    "sql_injection",
    "hardcoded_credentials",
    "security_eval",
    "cpp_buffer_overflow_risk",
    "cpp_array_delete_mismatch",
];

pub fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let project = args
        .project_path
        .canonicalize()
        .with_context(|| format!("project path {}", args.project_path.display()))?;

    println!("{} {}", "Analyzing".cyan().bold(), project.display());

    let memory = super::open_store()?;
    let config = EngineConfig {
        batch_size: args.batch_size,
        max_depth: args.max_depth,
        ..EngineConfig::default()
    };
    let engine = RecursiveEngine::new(&memory, config);
    let report = engine.analyze_project(&project).context("analysis failed")?;

    let issues = &report.issues;
    let shown: Vec<&Issue> = if args.quick {
        issues
            .iter()
            .filter(|issue| {
                issue.severity == Severity::Critical
                    || (issue.severity == Severity::High
                        && HIGH_IMPACT_TYPES.contains(&issue.issue_type.as_str()))
            })
            .collect()
    } else if args.verbose {
        issues.iter().collect()
    } else {
        issues
            .iter()
            .filter(|issue| ACTIONABLE.contains(&issue.severity))
            .collect()
    };

    let count_of = |severity: Severity| issues.iter().filter(|i| i.severity == severity).count();
    let critical = count_of(Severity::Critical);
    let high = count_of(Severity::High);
    let medium = count_of(Severity::Medium);

    println!(
        "Iteration {}: {} issues across {} files ({} batches, {:.2}s)",
        report.iteration,
        issues.len(),
        report.files_processed,
        report.batches_processed,
        report.duration_seconds,
    );
    if let Some(average) = report.average_prior_improvements {
        println!("Historical average: {average:.1} findings per iteration");
    }

    if critical > 0 {
        println!("{} {critical}", "critical:".red().bold());
    }
    if high > 0 {
        println!("{} {high}", "high:".yellow().bold());
    }
    if medium > 0 && !args.quick {
        if args.verbose {
            println!("{} {medium}", "medium:".normal());
        } else {
            println!("medium: {medium} (use --verbose to see)");
        }
    }

    for issue in &shown {
        let location = match issue.line {
            Some(line) => format!("{}:{line}", issue.file_path),
            None => issue.file_path.clone(),
        };
        println!(
            "  [{}] {} {}",
            issue.severity.to_string().to_uppercase(),
            location.bold(),
            issue.description
        );
        if args.verbose {
            if let Some(suggestion) = &issue.suggestion {
                println!("      suggestion: {suggestion}");
            }
        }
    }

    if let Some(output) = &args.output_file {
        let json = serde_json::to_string_pretty(issues).context("serializing issues")?;
        std::fs::write(output, json)
            .with_context(|| format!("writing {}", output.display()))?;
        println!("{} {}", "Results saved to".green(), output.display());
    }

    Ok(())
}
