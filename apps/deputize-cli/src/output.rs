//! Terminal output for reconciliation reports.

use deputize_core::identity::Roster;
use deputize_core::{ReconciliationReport, SinkOutcome, SinkReport};

fn use_color() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Print a success line (green checkmark)
pub fn print_success(message: &str) {
    if use_color() {
        println!("\x1b[32m✓\x1b[0m {message}");
    } else {
        println!("OK: {message}");
    }
}

/// Print a failure line (red cross)
pub fn print_failure(message: &str) {
    if use_color() {
        println!("\x1b[31m✗\x1b[0m {message}");
    } else {
        println!("FAILED: {message}");
    }
}

/// Print an indented detail line
pub fn print_detail(message: &str) {
    println!("    {message}");
}

/// Print a key-value pair with consistent formatting
pub fn print_key_value(key: &str, value: &str) {
    if use_color() {
        println!("  \x1b[1m{key}:\x1b[0m {value}");
    } else {
        println!("  {key}: {value}");
    }
}

/// Comma-separated roster, or `(nobody)`.
pub fn roster_line(roster: &Roster) -> String {
    if roster.is_empty() {
        "(nobody)".to_string()
    } else {
        roster
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Headline for one sink.
pub fn sink_headline(report: &SinkReport) -> String {
    let outcome = match &report.outcome {
        SinkOutcome::Unchanged => "already up to date".to_string(),
        SinkOutcome::Changed => "updated".to_string(),
        SinkOutcome::DryRun => "would change (dry run)".to_string(),
        SinkOutcome::Skipped { reason } => format!("skipped: {reason}"),
        SinkOutcome::Failed => match report.failed_in {
            Some(phase) => format!("failed while {phase}"),
            None => "failed".to_string(),
        },
    };
    format!("{} ({}): {outcome}", report.sink, report.kind)
}

/// Detail lines for one sink: changes, exclusions and errors.
pub fn sink_details(report: &SinkReport) -> Vec<String> {
    let mut lines = Vec::new();

    let summary = report.change_summary();
    if !summary.add.is_empty() {
        lines.push(format!("add: {}", summary.add.join(", ")));
    }
    if !summary.remove.is_empty() {
        lines.push(format!("remove: {}", summary.remove.join(", ")));
    }

    for error in report.resolution_errors() {
        lines.push(format!("excluded: {error}"));
    }

    if let Some(mutation) = &report.mutation {
        for failed in &mutation.failed {
            lines.push(format!("rejected: {failed}"));
        }
    }

    if let Some(error) = &report.error {
        lines.push(format!("error: {}", crate::error::error_chain(error)));
    }

    lines
}

/// Print the whole pass.
pub fn print_report(report: &ReconciliationReport) {
    println!();
    print_key_value("On-call", &roster_line(&report.roster));
    println!();

    for sink in &report.sinks {
        let headline = sink_headline(sink);
        if sink.is_success() {
            print_success(&headline);
        } else {
            print_failure(&headline);
        }
        for line in sink_details(sink) {
            print_detail(&line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deputize_core::identity::{identity_set, roster_from};
    use deputize_core::types::{SinkKind, SinkPhase};
    use deputize_core::mutation::{AppliedChange, FailedChange};
    use deputize_core::{diff, ChangeAction, MutationPlan, MutationResult, ResolvedIdentity};

    fn report(outcome: SinkOutcome, plan: Option<MutationPlan>) -> SinkReport {
        SinkReport {
            sink: "ldap".to_string(),
            kind: SinkKind::Ldap,
            phase: SinkPhase::Done,
            failed_in: None,
            resolution_failures: Vec::new(),
            plan,
            mutation: None,
            outcome,
            error: None,
        }
    }

    #[test]
    fn test_roster_line() {
        assert_eq!(roster_line(&Roster::new()), "(nobody)");
        assert_eq!(
            roster_line(&roster_from(["b@example.com", "a@example.com"])),
            "a@example.com, b@example.com"
        );
    }

    #[test]
    fn test_dry_run_details_list_plan() {
        let plan = diff(
            &identity_set(["alice", "carol"]),
            &identity_set(["alice", "bob"]),
            &identity_set(Vec::<String>::new()),
        );
        let sink = report(SinkOutcome::DryRun, Some(plan));

        assert_eq!(sink_headline(&sink), "ldap (ldap): would change (dry run)");
        assert_eq!(
            sink_details(&sink),
            vec!["add: carol".to_string(), "remove: bob".to_string()]
        );
    }

    #[test]
    fn test_partial_failure_details_list_applied_changes() {
        let plan = diff(
            &identity_set(["alice", "bob"]),
            &identity_set(Vec::<String>::new()),
            &identity_set(Vec::<String>::new()),
        );
        let mut sink = report(SinkOutcome::Failed, Some(plan));
        sink.phase = SinkPhase::Failed;
        sink.failed_in = Some(SinkPhase::Mutating);
        sink.mutation = Some(MutationResult {
            applied: vec![AppliedChange {
                action: ChangeAction::Add,
                identity: ResolvedIdentity::new("alice"),
            }],
            failed: vec![FailedChange {
                action: ChangeAction::Add,
                identity: ResolvedIdentity::new("bob"),
                error: "insufficient access".to_string(),
            }],
        });

        assert_eq!(sink_headline(&sink), "ldap (ldap): failed while mutating");
        let details = sink_details(&sink);
        assert_eq!(details[0], "add: alice");
        assert!(details.iter().all(|line| !line.starts_with("add:") || !line.contains("bob")));
        assert!(details.iter().any(|line| line.starts_with("rejected: ") && line.contains("bob")));
    }

    #[test]
    fn test_skipped_headline() {
        let sink = report(
            SinkOutcome::Skipped {
                reason: "nobody on call resolved".to_string(),
            },
            None,
        );
        assert_eq!(sink_headline(&sink), "ldap (ldap): skipped: nobody on call resolved");
        assert!(sink_details(&sink).is_empty());
    }
}
