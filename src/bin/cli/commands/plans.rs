//! Plan catalog commands: `plans` and `show`

use clap::{Arg, ArgMatches, Command};
use lightning_recovery::PlanSummary;

use super::reference_engine;
use crate::cli::utils::{
    format_minutes, load_config, print_header, print_separator, validate_disaster_type,
    CliResult, JsonOutput,
};
use crate::cli::GlobalOptions;

pub fn plans_command() -> Command {
    Command::new("plans").about("List registered recovery plans")
}

pub fn show_command() -> Command {
    Command::new("show")
        .about("Show the steps of one recovery plan")
        .arg(
            Arg::new("disaster_type")
                .help("Disaster type, e.g. database_failure")
                .required(true)
                .index(1),
        )
}

pub fn run_plans(matches: &ArgMatches) -> CliResult<()> {
    let global = GlobalOptions::from_matches(matches);
    let engine = reference_engine(load_config(global.config_path.as_deref())?)?;
    let summaries: Vec<PlanSummary> = engine
        .registry()
        .plans()
        .iter()
        .map(|p| p.summary())
        .collect();

    if global.is_json() {
        let mut output = JsonOutput::new();
        output
            .status(true)
            .add_uint("count", summaries.len() as u64)
            .add_value("plans", &summaries);
        output.print();
        return Ok(());
    }

    print_header("Recovery plans");
    println!(
        "{:<26} {:<20} {:>8} {:>6} {:>12}",
        "PLAN", "DISASTER TYPE", "PRIORITY", "STEPS", "ESTIMATE"
    );
    print_separator(76);
    for plan in &summaries {
        println!(
            "{:<26} {:<20} {:>8} {:>6} {:>12}",
            plan.id,
            plan.disaster_type.as_str(),
            plan.priority,
            plan.steps.len(),
            format_minutes(plan.total_estimated_minutes as f64)
        );
    }
    Ok(())
}

pub fn run_show(matches: &ArgMatches) -> CliResult<()> {
    let global = GlobalOptions::from_matches(matches);
    let disaster_type = validate_disaster_type(
        matches
            .get_one::<String>("disaster_type")
            .ok_or("disaster_type argument is required")?,
    )?;
    let engine = reference_engine(load_config(global.config_path.as_deref())?)?;
    let summary = engine.get_plan(disaster_type)?.summary();

    if global.is_json() {
        let mut output = JsonOutput::new();
        output.status(true).add_value("plan", &summary);
        output.print();
        return Ok(());
    }

    print_plan(&summary);
    Ok(())
}

fn print_plan(plan: &PlanSummary) {
    print_header(&format!("{} ({})", plan.id, plan.disaster_type));
    println!("Priority:           {}", plan.priority);
    println!(
        "Estimated duration: {}",
        format_minutes(plan.total_estimated_minutes as f64)
    );
    println!("Personnel:          {}", plan.required_personnel.join(", "));
    print_separator(60);

    for (idx, step) in plan.steps.iter().enumerate() {
        let mut flags = Vec::new();
        if !step.automated {
            flags.push("manual");
        }
        if step.has_rollback {
            flags.push("rollback");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };

        println!(
            "{:>2}. {} - {} ({} min){}",
            idx + 1,
            step.id,
            step.name,
            step.estimated_duration_minutes,
            flags
        );
        if step.description != step.name {
            println!("    {}", step.description);
        }
        if !step.dependencies.is_empty() {
            println!("    after: {}", step.dependencies.join(", "));
        }
    }
}
