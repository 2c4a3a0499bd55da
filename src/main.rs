use anyhow::Result;
use clap::Parser;

use helpdesk_workflow::cli::commands::decide::{DecideCommand, Decision};
use helpdesk_workflow::cli::commands::escalate::EscalateCommand;
#[cfg(feature = "database")]
use helpdesk_workflow::cli::commands::import::ImportCommand;
use helpdesk_workflow::cli::commands::rules::RulesCommand;
use helpdesk_workflow::cli::commands::schedule::ScheduleCommand;
use helpdesk_workflow::cli::commands::status::StatusCommand;
use helpdesk_workflow::cli::commands::submit::SubmitCommand;
use helpdesk_workflow::cli::commands::{show_usage, Command};
use helpdesk_workflow::cli::{Cli, Commands};
use helpdesk_workflow::{config, init_telemetry, shutdown_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return show_usage();
    };

    let config = config()?.clone();
    init_telemetry(&config.observability)?;
    let data = cli.data;

    let result = tokio::runtime::Runtime::new()?.block_on(async {
        match command {
            Commands::Submit {
                title,
                requester,
                description,
                category,
                department,
                cost,
                priority,
            } => {
                SubmitCommand {
                    data,
                    config,
                    title,
                    requester,
                    description,
                    category,
                    department,
                    cost,
                    priority,
                }
                .execute()
                .await
            }
            Commands::Approve {
                approval,
                actor,
                comment,
            } => {
                DecideCommand {
                    data,
                    config,
                    decision: Decision::Approve,
                    approval,
                    actor,
                    comment,
                }
                .execute()
                .await
            }
            Commands::Reject {
                approval,
                actor,
                comment,
            } => {
                DecideCommand {
                    data,
                    config,
                    decision: Decision::Reject,
                    approval,
                    actor,
                    comment,
                }
                .execute()
                .await
            }
            Commands::Escalate { json } => EscalateCommand { data, config, json }.execute().await,
            Commands::Schedule { interval_minutes } => {
                ScheduleCommand {
                    data,
                    config,
                    interval_minutes,
                }
                .execute()
                .await
            }
            Commands::Status { ticket } => StatusCommand { data, config, ticket }.execute().await,
            Commands::Rules => RulesCommand { data, config }.execute().await,
            #[cfg(feature = "database")]
            Commands::Import { snapshot } => ImportCommand { config, snapshot }.execute().await,
        }
    });

    shutdown_telemetry();
    result
}
