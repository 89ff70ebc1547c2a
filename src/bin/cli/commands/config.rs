//! Configuration command: print and validate the effective configuration

use clap::{Arg, ArgMatches, Command};
use lightning_recovery::config::ENV_PREFIX;
use lightning_recovery::RecoveryConfig;

use crate::cli::utils::{
    format_minutes, load_config, print_header, print_success, CliResult, JsonOutput,
};
use crate::cli::GlobalOptions;

pub fn config_command() -> Command {
    Command::new("config")
        .about("Show and validate the effective recovery configuration")
        .arg(
            Arg::new("file")
                .help("Configuration file to check (overrides --config)")
                .long("file")
                .short('f')
                .value_name("FILE"),
        )
}

pub fn run_config(matches: &ArgMatches) -> CliResult<()> {
    let global = GlobalOptions::from_matches(matches);
    let path = matches
        .get_one::<String>("file")
        .map(String::as_str)
        .or(global.config_path.as_deref());
    let config = load_config(path)?;

    if global.is_json() {
        let mut output = JsonOutput::new();
        output
            .status(true)
            .add_str("source", path.unwrap_or("defaults"))
            .add_value("config", &config);
        output.print();
        return Ok(());
    }

    if !global.quiet {
        print_config(path.unwrap_or("defaults"), &config);
    }
    print_success("configuration is valid");
    Ok(())
}

fn print_config(source: &str, config: &RecoveryConfig) {
    print_header("Recovery configuration");
    println!("Source:                 {} (+ {}* environment)", source, ENV_PREFIX);
    println!("RTO:                    {}", format_minutes(config.rto_minutes as f64));
    println!("RPO:                    {}", format_minutes(config.rpo_minutes as f64));
    println!("Health check interval:  {} ms", config.health_check_interval_ms);
    println!("Automatic failover:     {}", config.automatic_failover);
    println!("Dry-run step delay:     {} ms", config.dry_run_step_delay_ms);
    match config.step_timeout_ms {
        Some(ms) => println!("Step timeout:           {} ms", ms),
        None => println!("Step timeout:           none"),
    }
    println!("Rollback failure ratio: {}", config.rollback_failure_ratio);
}
