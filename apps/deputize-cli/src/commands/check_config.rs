//! Check-config command - Validate the config file and load every credential it needs

use clap::Args;

use super::{prepare, Adapters, ConfigArgs};
use crate::error::CliResult;
use crate::output::{print_key_value, print_success};

/// Arguments for the check-config command
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Execute the check-config command
///
/// Nothing is contacted beyond the secret provider.
pub async fn execute(args: CheckConfigArgs) -> CliResult<()> {
    let config = prepare(&args.config).await?;
    let adapters = Adapters::build(&config)?;

    print_success("Configuration is valid");
    print_key_value("Secrets", &config.secrets.provider.to_string());
    print_key_value("Schedules", &config.source.pagerduty.schedules.join(", "));
    if let Some(gitlab) = config.gitlab() {
        if !gitlab.approver_schedules.is_empty() {
            print_key_value("Approver schedules", &gitlab.approver_schedules.join(", "));
        }
    }
    print_key_value("Sinks", &adapters.sink_names().join(", "));

    let channels = config.notification_channels();
    if !channels.is_empty() {
        print_key_value("Notifications", &channels.join(", "));
    }
    print_key_value(
        "Mode",
        match (config.reconcile.concurrent, config.reconcile.dry_run) {
            (true, false) => "concurrent",
            (false, false) => "sequential",
            (true, true) => "concurrent, dry run",
            (false, true) => "sequential, dry run",
        },
    );

    Ok(())
}
