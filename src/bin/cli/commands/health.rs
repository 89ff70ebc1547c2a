//! Health classification command
//!
//! Reads a health report as JSON and shows what the watchdog would do
//! with it.

use clap::{Arg, ArgMatches, Command};
use lightning_recovery::{classify_disaster, HealthReport, ServiceState};

use crate::cli::utils::{
    load_config, print_header, print_info, print_warning, CliError, CliResult, JsonOutput,
};
use crate::cli::GlobalOptions;

pub fn health_command() -> Command {
    Command::new("health")
        .about("Classify a health report (JSON) the way the watchdog would")
        .arg(
            Arg::new("report")
                .help("Path to a health report JSON file")
                .required(true)
                .index(1),
        )
}

pub fn run_health(matches: &ArgMatches) -> CliResult<()> {
    let global = GlobalOptions::from_matches(matches);
    let path = matches
        .get_one::<String>("report")
        .ok_or("report argument is required")?;
    let config = load_config(global.config_path.as_deref())?;

    let content = std::fs::read_to_string(path).map_err(CliError::from)?;
    let report: HealthReport = serde_json::from_str(&content)
        .map_err(|e| CliError::Validation(format!("invalid health report {}: {}", path, e)))?;

    let down = report.status == ServiceState::Down;
    let classification = down.then(|| classify_disaster(&report));
    let would_trigger = down && config.automatic_failover;

    if global.is_json() {
        let mut output = JsonOutput::new();
        output
            .status(true)
            .add_str("overall", report.status.as_str())
            .add_string_array(
                "down_services",
                &report
                    .down_services()
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>(),
            )
            .add_value("classification", &classification)
            .add_bool("failover", would_trigger);
        output.print();
        return Ok(());
    }

    print_header("Health report");
    for (name, service) in &report.services {
        println!("  {:<20} {}", name, service.status.as_str());
    }
    println!("Overall: {}", report.status.as_str());

    match classification {
        Some(disaster_type) if would_trigger => {
            print_warning(&format!("automatic failover would start the {} plan", disaster_type))
        }
        Some(disaster_type) => print_warning(&format!(
            "classified as {}; automatic failover is disabled",
            disaster_type
        )),
        None => print_info("no failover needed"),
    }
    Ok(())
}
