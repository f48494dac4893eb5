use std::collections::BTreeMap;

use tabled::settings::Style;
use tabled::{Table, Tabled};
use termtree::Tree;

use tfmerge::reconcile::{DependencyRewrite, UnresolvedDependency};
use tfmerge::{DiffReport, ReconcileOutcome, ReconcileReport, RunFailure};

use crate::cli::OutputFormat;

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Depends on")]
    depends_on: String,
}

#[derive(Tabled)]
struct MovedRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Moved")]
    address: String,
}

pub fn render_diff(report: &DiffReport, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(report);
    }

    if report.in_sync {
        return Ok("Target and discovered state are in sync; nothing to merge.".to_string());
    }

    let mut out = format!(
        "{} already managed, {} to merge\n",
        report.already_present.len(),
        report.candidates.len()
    );
    if !report.candidates.is_empty() {
        let rows = report.candidates.iter().enumerate().map(|(i, c)| CandidateRow {
            position: i + 1,
            address: c.address(),
            id: c.record.id.clone(),
            depends_on: c.record.depends_on.join(", "),
        });
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    }
    Ok(out)
}

pub fn render_report(report: &ReconcileReport, format: OutputFormat) -> serde_json::Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(report);
    }

    if report.outcome == ReconcileOutcome::NoOp {
        return Ok(format!("[{}] nothing to merge", report.run_id));
    }

    let mut out = format!(
        "[{}] moved {} resource(s), appended {} block(s) to {}\n",
        report.run_id,
        report.moved.len(),
        report.emitted_blocks,
        report.config_file.display()
    );
    let rows = report.moved.iter().enumerate().map(|(i, address)| MovedRow {
        position: i + 1,
        address: address.clone(),
    });
    out.push_str(&Table::new(rows).with(Style::rounded()).to_string());

    if report.rewrites.iter().any(DependencyRewrite::changed) || !report.unresolved.is_empty() {
        out.push('\n');
        out.push_str(&dependency_tree(&report.rewrites, &report.unresolved).to_string());
    }
    Ok(out)
}

/// Candidate -> `from -> to` leaves, unresolved entries marked. Rewrites that
/// kept the same address are left out.
fn dependency_tree(
    rewrites: &[DependencyRewrite],
    unresolved: &[UnresolvedDependency],
) -> Tree<String> {
    let mut by_resource: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for rewrite in rewrites.iter().filter(|r| r.changed()) {
        by_resource
            .entry(&rewrite.resource)
            .or_default()
            .push(format!("{} -> {}", rewrite.from, rewrite.to));
    }
    for entry in unresolved {
        by_resource
            .entry(&entry.resource)
            .or_default()
            .push(format!("{} (unresolved: {})", entry.dependency, entry.reason));
    }

    Tree::new("dependencies".to_string()).with_leaves(
        by_resource
            .into_iter()
            .map(|(resource, leaves)| Tree::new(resource.to_string()).with_leaves(leaves)),
    )
}

pub fn render_failure(failure: &RunFailure) -> String {
    let mut out = format!("{failure}\n");
    if failure.moved.is_empty() {
        out.push_str("no resources were moved\n");
    } else {
        out.push_str(&format!(
            "already moved (not rolled back): {}\n",
            failure.moved.join(", ")
        ));
    }
    if let Some((stdout, stderr)) = failure.captured_output() {
        if !stdout.trim().is_empty() {
            out.push_str(&format!("--- stdout ---\n{}\n", stdout.trim_end()));
        }
        if !stderr.trim().is_empty() {
            out.push_str(&format!("--- stderr ---\n{}\n", stderr.trim_end()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tfmerge::reconcile::UnresolvedReason;
    use tfmerge::{CommandError, ReconcileError, RunPhase};

    fn report() -> ReconcileReport {
        ReconcileReport {
            run_id: "run-1".to_string(),
            outcome: ReconcileOutcome::Emitted,
            in_sync: false,
            already_present: vec!["vm.web1".to_string()],
            moved: vec!["vm.db1".to_string()],
            rewrites: vec![DependencyRewrite {
                resource: "vm.db1".to_string(),
                position: 0,
                from: "vm.web1".to_string(),
                to: "vm.web_server".to_string(),
            }],
            unresolved: vec![UnresolvedDependency {
                resource: "vm.db1".to_string(),
                dependency: "data_x.y".to_string(),
                reason: UnresolvedReason::Dangling,
            }],
            backups: vec![],
            config_file: PathBuf::from("/repo/main.tf"),
            emitted_blocks: 1,
        }
    }

    #[test]
    fn test_render_report_table() {
        let text = render_report(&report(), OutputFormat::Table).unwrap();
        assert!(text.contains("moved 1 resource(s)"));
        assert!(text.contains("vm.db1"));
        assert!(text.contains("vm.web1 -> vm.web_server"));
        assert!(text.contains("data_x.y (unresolved: not in discovered state)"));
    }

    #[test]
    fn test_unchanged_rewrites_are_not_listed() {
        let mut same = report();
        same.unresolved.clear();
        same.rewrites.push(DependencyRewrite {
            resource: "vm.db1".to_string(),
            position: 1,
            from: "vm.a".to_string(),
            to: "vm.a".to_string(),
        });
        let text = render_report(&same, OutputFormat::Table).unwrap();
        assert!(text.contains("vm.web1 -> vm.web_server"));
        assert!(!text.contains("vm.a -> vm.a"));

        same.rewrites.remove(0);
        let text = render_report(&same, OutputFormat::Table).unwrap();
        assert!(!text.contains("dependencies"));
    }

    #[test]
    fn test_render_report_json() {
        let text = render_report(&report(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["outcome"], "emitted");
        assert_eq!(value["moved"][0], "vm.db1");
    }

    #[test]
    fn test_render_noop_report() {
        let mut noop = report();
        noop.outcome = ReconcileOutcome::NoOp;
        let text = render_report(&noop, OutputFormat::Table).unwrap();
        assert_eq!(text, "[run-1] nothing to merge");
    }

    #[test]
    fn test_render_in_sync_diff() {
        let diff = DiffReport {
            in_sync: true,
            ..DiffReport::default()
        };
        let text = render_diff(&diff, OutputFormat::Table).unwrap();
        assert!(text.contains("in sync"));
    }

    #[test]
    fn test_render_failure_with_output() {
        let failure = RunFailure {
            phase: RunPhase::Moving,
            moved: vec!["vm.a".to_string()],
            source: ReconcileError::Subprocess(CommandError::Failed {
                program: "terraform".to_string(),
                args: vec!["state".to_string(), "mv".to_string()],
                code: Some(1),
                stdout: String::new(),
                stderr: "Error: resource not found\n".to_string(),
            }),
        };
        let text = render_failure(&failure);
        assert!(text.contains("already moved (not rolled back): vm.a"));
        assert!(text.contains("--- stderr ---\nError: resource not found"));
        assert!(!text.contains("--- stdout ---"));
    }
}
