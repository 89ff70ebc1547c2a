//! Lightning Recovery CLI
//!
//! Operator front end for the recovery engine: inspect the plan catalog,
//! run recovery drills, validate configuration and classify a health
//! report.
//!
//! # Output Formats
//!
//! - `text` (default): human-readable output
//! - `json`: machine-readable output for scripting
//!
//! Use `--format` or `-o` to pick one, `--quiet` or `-q` to suppress
//! informational messages and `--config` to load a JSON configuration file.

pub mod commands;
pub mod utils;

use clap::{Arg, Command};
use utils::CliResult;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}. Use 'text' or 'json'.", s)),
        }
    }
}

/// Options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub config_path: Option<String>,
}

impl GlobalOptions {
    pub fn from_matches(matches: &clap::ArgMatches) -> Self {
        let output_format = matches
            .get_one::<String>("format")
            .map(|s| s.parse().unwrap_or_default())
            .unwrap_or_default();

        GlobalOptions {
            output_format,
            quiet: matches.get_flag("quiet"),
            verbose: matches.get_flag("verbose"),
            config_path: matches.get_one::<String>("config").cloned(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.output_format == OutputFormat::Json
    }

    /// Whether informational text should be printed
    pub fn chatty(&self) -> bool {
        !self.is_json() && !self.quiet
    }
}

pub fn build_cli() -> Command {
    Command::new("lightning-recovery")
        .about("Disaster recovery plans, drills and health classification")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("format")
                .help("Output format: text (default) or json")
                .short('o')
                .long("format")
                .global(true)
                .value_parser(["text", "json"])
                .default_value("text"),
        )
        .arg(
            Arg::new("quiet")
                .help("Suppress informational output (errors still shown)")
                .short('q')
                .long("quiet")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .help("Enable debug logging")
                .short('v')
                .long("verbose")
                .global(true)
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .help("Recovery configuration file (JSON)")
                .short('c')
                .long("config")
                .global(true)
                .value_name("FILE"),
        )
        .subcommand(commands::plans::plans_command())
        .subcommand(commands::plans::show_command())
        .subcommand(commands::drill::drill_command())
        .subcommand(commands::config::config_command())
        .subcommand(commands::health::health_command())
}

pub async fn run(matches: clap::ArgMatches) -> CliResult<()> {
    match matches.subcommand() {
        Some(("plans", sub)) => commands::plans::run_plans(sub),
        Some(("show", sub)) => commands::plans::run_show(sub),
        Some(("drill", sub)) => commands::drill::run_drill(sub).await,
        Some(("config", sub)) => commands::config::run_config(sub),
        Some(("health", sub)) => commands::health::run_health(sub),
        _ => Err(utils::CliError::Usage(
            "Unknown command. Use --help for available commands.".to_string(),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from(["lightning-recovery", "plans", "-o", "json", "-q"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let global = GlobalOptions::from_matches(sub);
        assert!(global.is_json());
        assert!(global.quiet);
        assert!(!global.chatty());
    }

    #[test]
    fn test_drill_skip_is_repeatable() {
        let matches = build_cli()
            .try_get_matches_from([
                "lightning-recovery",
                "drill",
                "database_failure",
                "--skip",
                "snapshot_database",
                "--skip",
                "notify_stakeholders",
            ])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "drill");
        assert_eq!(sub.get_many::<String>("skip").unwrap().count(), 2);
    }
}
