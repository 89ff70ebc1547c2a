mod cli;

use cli::utils::{already_reported, engine_error_code, exit_code_for, print_error};
use tracing::Level;

#[tokio::main]
async fn main() {
    let matches = cli::build_cli().get_matches();
    let global = cli::GlobalOptions::from_matches(&matches);

    let level = if global.verbose {
        Level::DEBUG
    } else if global.is_json() {
        Level::ERROR
    } else {
        Level::WARN
    };
    if let Err(e) = lightning_recovery::logging::init_logging(level, global.is_json()) {
        print_error(&e.to_string());
    }

    if let Err(e) = cli::run(matches).await {
        if global.is_json() {
            if !already_reported(e.as_ref()) {
                let mut output = cli::utils::json_error(&e.to_string());
                if let Some(code) = engine_error_code(e.as_ref()) {
                    output.add_value("error_code", &code);
                }
                output.print();
            }
        } else {
            print_error(&e.to_string());
        }
        std::process::exit(exit_code_for(e.as_ref()));
    }
}
