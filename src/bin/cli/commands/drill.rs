//! Recovery drill command

use clap::{Arg, ArgMatches, Command};
use lightning_recovery::{RecoveryOptions, RecoveryTestReport, StepPhase};

use super::reference_engine;
use crate::cli::utils::{
    format_minutes, load_config, print_header, print_separator, print_success, print_warning,
    validate_disaster_type, validate_skip_steps, CliError, CliResult, JsonOutput,
};
use crate::cli::GlobalOptions;

pub fn drill_command() -> Command {
    Command::new("drill")
        .about("Dry-run a recovery plan and report recommendations")
        .arg(
            Arg::new("disaster_type")
                .help("Disaster type, e.g. database_failure")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("skip")
                .help("Step id to skip (repeatable)")
                .long("skip")
                .value_name("STEP_ID")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("progress")
                .help("Print each step transition as it happens")
                .long("progress")
                .action(clap::ArgAction::SetTrue),
        )
}

pub async fn run_drill(matches: &ArgMatches) -> CliResult<()> {
    let global = GlobalOptions::from_matches(matches);
    let disaster_type = validate_disaster_type(
        matches
            .get_one::<String>("disaster_type")
            .ok_or("disaster_type argument is required")?,
    )?;
    let skips: Vec<String> = matches
        .get_many::<String>("skip")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let engine = reference_engine(load_config(global.config_path.as_deref())?)?;
    let plan = engine.get_plan(disaster_type)?;
    validate_skip_steps(&plan, &skips)?;

    let mut options = RecoveryOptions::new();
    for step in skips {
        options = options.skip(step);
    }
    if matches.get_flag("progress") && global.chatty() {
        options = options.on_progress(|step_id, phase, message| {
            let marker = match phase {
                StepPhase::Started => "..",
                StepPhase::Completed => "ok",
                StepPhase::Failed => "!!",
            };
            println!("  [{}] {} {}", marker, step_id, message);
        });
    }

    if global.chatty() {
        println!("Running recovery drill for {} (plan {})", disaster_type, plan.id);
    }
    let report = engine.test_recovery_plan(disaster_type, options).await?;

    if global.is_json() {
        let mut output = JsonOutput::new();
        output
            .status(report.success)
            .add_str("plan_id", &report.plan_id)
            .add_str("disaster_type", report.disaster_type.as_str())
            .add_bool("passed", report.success)
            .add_value("test_results", &report.test_results)
            .add_string_array("recommendations", &report.recommendations)
            .add_value("execution", &report.execution);
        output.print();
    } else if !global.quiet {
        print_report(&report);
    }

    if !report.success {
        let failed = report.test_results.iter().filter(|r| !r.success).count();
        return Err(CliError::DrillFailed(format!(
            "{} of {} steps failed in plan {}",
            failed,
            report.test_results.len(),
            report.plan_id
        ))
        .into());
    }
    Ok(())
}

fn print_report(report: &RecoveryTestReport) {
    print_header(&format!("Drill: {}", report.plan_id));
    for result in &report.test_results {
        println!(
            "  {} {:<28} {:>4} min  {}",
            if result.success { "PASS" } else { "FAIL" },
            result.step_id,
            result.duration_minutes,
            result.message
        );
    }
    print_separator(60);

    if let Some(minutes) = report.execution.actual_duration_minutes {
        println!("Drill duration: {}", format_minutes(minutes));
    }
    if report.success {
        print_success(&format!("{} steps simulated", report.test_results.len()));
    } else {
        print_warning("drill did not complete cleanly");
    }

    if !report.recommendations.is_empty() {
        print_header("Recommendations");
        for rec in &report.recommendations {
            println!("  - {}", rec);
        }
    }
}
