//! `fixpoint fix` - apply fixes through the safety pipeline

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;
use fixpoint_core::fixing::safety::{score_proposal, SecurityAudit};
use fixpoint_core::fixing::{
    generate_proposals, ApprovalDecision, ApprovalMode, ApprovalPrompt, FixApplier, FixError,
    FixProposal, InteractiveApproval,
};

pub struct FixArgs {
    pub project_path: PathBuf,
    pub issues_file: PathBuf,
    pub dynamic_approval: bool,
    pub conservative_level: f64,
    pub interactive: bool,
}

pub fn run(args: FixArgs) -> anyhow::Result<()> {
    let project = args
        .project_path
        .canonicalize()
        .with_context(|| format!("project path {}", args.project_path.display()))?;

    println!("{} {}", "Fix application for".cyan().bold(), project.display());
    println!(
        "mode: {}",
        if args.interactive { "interactive" } else { "automatic" }
    );

    let issues = super::load_issues(&args.issues_file)?;
    let audit = SecurityAudit::in_dir(&project);

    let mut proposals = generate_proposals(&issues, &project);
    println!("{} proposals generated from {} issues", proposals.len(), issues.len());

    if args.dynamic_approval {
        // The conservative floor is non-negotiable: user values below 0.9
        // are raised, never honored
        let threshold = args.conservative_level.max(0.9);
        let before = proposals.len();
        proposals.retain(|proposal| score_proposal(proposal, Some(&audit)) >= threshold);
        println!(
            "dynamic approval: {}/{} proposals meet the safety threshold (>= {threshold:.1})",
            proposals.len(),
            before
        );
        if proposals.len() < before {
            println!(
                "{} {} risky proposals filtered out",
                "safety:".yellow(),
                before - proposals.len()
            );
        }
    }

    let mode = if args.interactive {
        ApprovalMode::Interactive
    } else {
        ApprovalMode::AutoApproveSafe
    };
    let gate = if args.dynamic_approval {
        InteractiveApproval::new(mode).with_threshold(args.conservative_level)
    } else {
        InteractiveApproval::new(mode)
    };

    let mut terminal = TerminalPrompt;
    let prompt: Option<&mut dyn ApprovalPrompt> =
        if args.interactive { Some(&mut terminal) } else { None };
    let (approved, rejected) = gate.process_batch(proposals, Some(&audit), prompt);

    println!("{} approved, {} rejected", approved.len(), rejected.len());
    if approved.is_empty() {
        println!("no fixes were approved");
        return Ok(());
    }

    // Full project backup before the first write; this is the rollback
    // ground truth if a later step leaves the tree inconsistent
    let applier = FixApplier::new(&project);
    let backup_dir = std::env::temp_dir().join(format!("fixpoint_backup_{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&backup_dir).context("creating backup directory")?;
    let backup_path = applier
        .create_project_backup(&backup_dir)
        .context("project backup failed, refusing to continue")?;
    println!("backup: {}", backup_path.display());

    let mut applied = 0usize;
    let mut blocked = 0usize;
    for (index, result) in applier.apply_batch(&approved) {
        match result {
            Ok(()) => {
                applied += 1;
                println!(
                    "  {} {} ({})",
                    "applied".green(),
                    approved[index].file_path,
                    approved[index].issue_type
                );
            }
            Err(e @ FixError::RollbackFailed(_)) => {
                // Surface immediately with the distinctive exit code; the
                // backup directory is retained for manual recovery
                return Err(e.into());
            }
            Err(e) => {
                blocked += 1;
                println!(
                    "  {} {} ({e})",
                    "blocked".red(),
                    approved[index].file_path
                );
            }
        }
    }

    println!(
        "{} {applied} applied, {blocked} blocked; backup retained at {}",
        "done:".green().bold(),
        backup_path.display()
    );
    Ok(())
}

/// Terminal reviewer for interactive mode
struct TerminalPrompt;

impl ApprovalPrompt for TerminalPrompt {
    fn review(&mut self, proposal: &FixProposal, score: f64, diff: &str) -> ApprovalDecision {
        println!();
        println!(
            "{} {} at {}:{}",
            "proposal:".bold(),
            proposal.issue_type,
            proposal.file_path,
            proposal.line_number
        );
        println!("severity: {} | safety score: {score:.2}", proposal.severity);
        println!("{}", proposal.description);
        if !proposal.educational_explanation.is_empty() {
            println!("{}", proposal.educational_explanation.dimmed());
        }
        println!("{diff}");

        loop {
            print!("apply this fix? (y)es / (n)o / (s)kip: ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return ApprovalDecision::Reject;
            }
            match line.trim().to_lowercase().as_str() {
                "y" | "yes" => return ApprovalDecision::Approve,
                "n" | "no" => return ApprovalDecision::Reject,
                "s" | "skip" => return ApprovalDecision::Skip,
                _ => println!("please answer y, n, or s"),
            }
        }
    }
}
