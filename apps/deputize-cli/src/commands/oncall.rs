//! Oncall command - Reconcile every enabled sink with the current on-call roster

use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use deputize_core::traits::{ChangeNotifier, RosterSource, Sink};
use deputize_core::{
    PlanSummary, ReconcileTarget, Reconciler, ReconciliationReport, SinkOutcome, TimeWindow,
};

use super::{prepare, Adapters, ConfigArgs};
use crate::error::{error_chain, CliError, CliResult};
use crate::output::print_report;

/// Arguments for the oncall command
#[derive(Args, Debug)]
pub struct OncallArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Compute and print the changes without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Reconcile one sink at a time
    #[arg(long)]
    pub sequential: bool,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for one pass
#[derive(Serialize)]
struct ReportOutput {
    roster: Vec<String>,
    success: bool,
    sinks: Vec<SinkOutput>,
}

#[derive(Serialize)]
struct SinkOutput {
    name: String,
    kind: String,
    outcome: SinkOutcome,
    changes: PlanSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    excluded: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ReconciliationReport> for ReportOutput {
    fn from(report: &ReconciliationReport) -> Self {
        Self {
            roster: report.roster.iter().map(ToString::to_string).collect(),
            success: report.is_success(),
            sinks: report
                .sinks
                .iter()
                .map(|sink| SinkOutput {
                    name: sink.sink.clone(),
                    kind: sink.kind.to_string(),
                    outcome: sink.outcome.clone(),
                    changes: sink.change_summary(),
                    excluded: sink
                        .resolution_errors()
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                    error: sink.error.as_ref().map(|e| error_chain(e)),
                })
                .collect(),
        }
    }
}

/// Execute the oncall command
pub async fn execute(args: OncallArgs) -> CliResult<()> {
    let mut config = prepare(&args.config).await?;
    if args.dry_run {
        config.reconcile.dry_run = true;
    }
    if args.sequential {
        config.reconcile.concurrent = false;
    }

    let adapters = Adapters::build(&config)?;
    let pagerduty = &config.source.pagerduty;
    let window = TimeWindow::starting_now(pagerduty.window());

    let roster = adapters
        .source
        .fetch_roster(&pagerduty.schedules, &window)
        .await?;

    let mut targets = Vec::new();
    if let Some(ldap) = &adapters.ldap {
        targets.push(ReconcileTarget::new(ldap.clone()));
    }
    if let Some(gitlab) = &adapters.gitlab {
        let approvers = &gitlab.config().approver_schedules;
        targets.push(
            approver_target(
                &adapters.source,
                ReconcileTarget::new(gitlab.clone()),
                approvers,
                &window,
            )
            .await,
        );
    }
    for slack in &adapters.slack {
        targets.push(ReconcileTarget::new(slack.clone()));
    }

    let mut reconciler = Reconciler::new(config.reconcile.clone());
    if let Some(notifier) = &adapters.notifier {
        reconciler = reconciler.with_notifier(notifier.clone() as Arc<dyn ChangeNotifier>);
    }

    let report = reconciler.reconcile(&roster, &targets).await;

    if let Some(ldap) = &adapters.ldap {
        ldap.close().await;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ReportOutput::from(&report))?);
    } else {
        print_report(&report);
    }

    failures(&report)
}

/// Point `target` at the approver roster when approver schedules are set.
///
/// A failed fetch fails only this target; the rest of the pass still runs.
async fn approver_target(
    source: &dyn RosterSource,
    target: ReconcileTarget,
    approvers: &[String],
    window: &TimeWindow,
) -> ReconcileTarget {
    if approvers.is_empty() {
        return target;
    }
    match source.fetch_roster(approvers, window).await {
        Ok(roster) => target.with_roster(roster),
        Err(e) => {
            tracing::warn!(
                sink = %target.sink.name(),
                error = %e,
                "Failed to fetch approver roster"
            );
            target.with_roster_error(&e)
        }
    }
}

/// `SinksFailed` naming every failed sink, or `Ok` when all succeeded.
fn failures(report: &ReconciliationReport) -> CliResult<()> {
    let failed: Vec<&str> = report.failed_sinks().map(|s| s.sink.as_str()).collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::SinksFailed {
            count: failed.len(),
            sinks: failed.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deputize_connector_rest::{GitlabConfig, GitlabSink, PagerDutyConfig, PagerDutySource};
    use deputize_core::identity::roster_from;
    use deputize_core::types::{SinkKind, SinkPhase};
    use deputize_core::{ReconcileError, Roster, SinkError, SinkReport, TargetRoster};

    fn sink(name: &str, outcome: SinkOutcome, error: Option<SinkError>) -> SinkReport {
        let failed = outcome == SinkOutcome::Failed;
        SinkReport {
            sink: name.to_string(),
            kind: SinkKind::Gitlab,
            phase: if failed { SinkPhase::Failed } else { SinkPhase::Done },
            failed_in: failed.then_some(SinkPhase::Snapshotting),
            resolution_failures: Vec::new(),
            plan: None,
            mutation: None,
            outcome,
            error: error.map(|source| ReconcileError::SnapshotUnavailable {
                sink: name.to_string(),
                source,
            }),
        }
    }

    #[test]
    fn test_failures_lists_failed_sinks() {
        let report = ReconciliationReport {
            roster: roster_from(["a@example.com"]),
            sinks: vec![
                sink("ldap", SinkOutcome::Unchanged, None),
                sink(
                    "gitlab",
                    SinkOutcome::Failed,
                    Some(SinkError::AuthorizationFailed {
                        operation: "add member".to_string(),
                    }),
                ),
                sink("slack:C01", SinkOutcome::Failed, None),
            ],
        };

        match failures(&report) {
            Err(CliError::SinksFailed { count, sinks }) => {
                assert_eq!(count, 2);
                assert_eq!(sinks, "gitlab, slack:C01");
            }
            other => panic!("expected SinksFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_json_output_shape() {
        let report = ReconciliationReport {
            roster: roster_from(["a@example.com"]),
            sinks: vec![sink("ldap", SinkOutcome::Unchanged, None)],
        };

        let value = serde_json::to_value(ReportOutput::from(&report)).unwrap();
        assert_eq!(value["roster"][0], "a@example.com");
        assert_eq!(value["success"], true);
        assert_eq!(value["sinks"][0]["name"], "ldap");
        assert!(value["sinks"][0].get("error").is_none());
        assert!(failures(&report).is_ok());
    }

    #[test]
    fn test_json_output_includes_error_chain() {
        let report = ReconciliationReport {
            roster: Roster::new(),
            sinks: vec![sink(
                "gitlab",
                SinkOutcome::Failed,
                Some(SinkError::AuthorizationFailed {
                    operation: "add member".to_string(),
                }),
            )],
        };

        let value = serde_json::to_value(ReportOutput::from(&report)).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["sinks"][0]["outcome"]["outcome"], "failed");
        assert_eq!(
            value["sinks"][0]["error"],
            "[gitlab] snapshot unavailable: authorization failed: insufficient permissions for add member"
        );
    }

    fn gitlab_target() -> ReconcileTarget {
        let config = GitlabConfig::new("https://gitlab.example.com/", "ops/approvers")
            .with_token("gl-token");
        ReconcileTarget::new(Arc::new(GitlabSink::new(config).unwrap()))
    }

    fn unreachable_source() -> PagerDutySource {
        PagerDutySource::new(&PagerDutyConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            token: Some("pd-token".to_string()),
            ..PagerDutyConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_approver_fetch_failure_marks_only_gitlab() {
        let window = TimeWindow::starting_now(PagerDutyConfig::default().window());
        let target = approver_target(
            &unreachable_source(),
            gitlab_target(),
            &["Ops Approvers".to_string()],
            &window,
        )
        .await;

        match &target.roster {
            TargetRoster::Unavailable(message) => {
                assert!(message.contains("Ops Approvers"), "{message}");
            }
            other => panic!("expected an unavailable roster, got {other:?}"),
        }
        assert!(target.roster_or(&Roster::new()).is_err());
    }

    #[tokio::test]
    async fn test_no_approvers_follows_shared_roster() {
        let window = TimeWindow::starting_now(PagerDutyConfig::default().window());
        let target = approver_target(&unreachable_source(), gitlab_target(), &[], &window).await;
        assert!(matches!(target.roster, TargetRoster::Shared));
    }
}
