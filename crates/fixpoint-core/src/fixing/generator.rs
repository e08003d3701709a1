//! Issue-to-proposal generation
//!
//! Synthesizes concrete edits for the handful of issue types with a safe
//! mechanical fix. Everything else abstains: a proposal that cannot be
//! derived verbatim from the file on disk is not offered at all.

use std::path::Path;

use crate::analysis::Issue;

use super::FixProposal;

/// Build proposals for every issue that admits a mechanical fix
///
/// Issues whose fix would be empty, or identical to the original, are
/// silently dropped.
pub fn generate_proposals(issues: &[Issue], project_root: &Path) -> Vec<FixProposal> {
    issues
        .iter()
        .filter_map(|issue| proposal_for(issue, project_root))
        .collect()
}

fn proposal_for(issue: &Issue, project_root: &Path) -> Option<FixProposal> {
    let line_number = issue.line?;
    let path = resolve(project_root, &issue.file_path);
    let content = std::fs::read_to_string(&path).ok()?;
    let lines: Vec<&str> = content.lines().collect();
    if line_number == 0 || line_number as usize > lines.len() {
        return None;
    }

    let (original, proposed, line_number) =
        synthesize_fix(issue, &content, &lines, line_number)?;
    if original.is_empty() || proposed.is_empty() || original == proposed {
        return None;
    }

    let educational_explanation = issue
        .educational_content
        .clone()
        .unwrap_or_else(|| format!("This fix addresses a {} issue.", issue.issue_type));

    Some(FixProposal {
        file_path: issue.file_path.clone(),
        issue_type: issue.issue_type.clone(),
        severity: issue.severity,
        description: issue.description.clone(),
        original_code: original,
        proposed_fix: proposed,
        line_number,
        educational_explanation,
        safety_score: issue
            .extra
            .get("safety_score")
            .and_then(|v| v.as_u64())
            .map(|v| v.min(100) as u32)
            .unwrap_or(50),
        context: issue.context,
        auto_approvable: true,
    })
}

/// The per-type fix synthesizers; `None` means abstain
fn synthesize_fix(
    issue: &Issue,
    content: &str,
    lines: &[&str],
    line_number: u32,
) -> Option<(String, String, u32)> {
    let line = lines[line_number as usize - 1];
    let stripped = line.trim();

    match issue.issue_type.as_str() {
        "bare_except" => {
            if stripped == "except:" {
                Some((
                    line.to_string(),
                    line.replace("except:", "except Exception as e:"),
                    line_number,
                ))
            } else if stripped == "except Exception:" {
                Some((
                    line.to_string(),
                    line.replace("except Exception:", "except Exception as e:"),
                    line_number,
                ))
            } else {
                None
            }
        }

        "debugging" => {
            // Only rewrite prints when the file already has a logger;
            // adding the import ourselves is out of bounds for a safe fix
            if !line.contains("print(") || logger_import_missing(content) {
                return None;
            }
            let fixed = line.replace("print(", "logger.info(");
            Some((line.to_string(), fixed, line_number))
        }

        "security_eval" => {
            if !line.contains("eval(") && !line.contains("exec(") {
                return None;
            }
            // Annotate, never delete: removing the call is a behavior change
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            let annotated = format!(
                "{indent}# SECURITY WARNING: dynamic evaluation detected - consider safer alternatives\n{line}"
            );
            Some((line.to_string(), annotated, line_number))
        }

        // Maintenance comments are for humans; acknowledging them is the fix
        "maintenance" => None,

        "cpp_missing_include" => {
            let fix_content = issue.extra.get("cpp_fix_content")?.as_str()?;
            // The issue's line is the insertion point just past the last
            // include; anchor the edit on that last include line so the
            // replacement reads include + newline + new include
            if line_number > 1 {
                let anchor_number = line_number - 1;
                let anchor = lines[anchor_number as usize - 1];
                Some((
                    anchor.to_string(),
                    format!("{anchor}\n{fix_content}"),
                    anchor_number,
                ))
            } else {
                let anchor = lines[0];
                Some((anchor.to_string(), format!("{fix_content}\n{anchor}"), 1))
            }
        }

        _ => None,
    }
}

/// Whether the file lacks a usable logging setup
fn logger_import_missing(content: &str) -> bool {
    let has_import = content.contains("import logging") || content.contains("from logging import");
    let has_logger = content.contains("logger = ") || content.contains("logger=");
    !(has_import && has_logger)
}

fn resolve(project_root: &Path, file_path: &str) -> std::path::PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
