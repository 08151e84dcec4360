use clap::ArgMatches;
use std::process;
use tracing::error;
use wrf_levels::{
    config::{build_cli, InspectConfig, PreprocessConfig},
    logging, pipeline,
    viewer::run_inspect,
};

fn main() {
    let matches = build_cli().get_matches();

    let result = match matches.subcommand() {
        Some(("preprocess", sub_matches)) => run_preprocess(sub_matches),
        Some(("inspect", sub_matches)) => run_inspector(sub_matches),
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            process::exit(1);
        }
    };

    if let Err(message) = result {
        error!("{}", message);
        process::exit(1);
    }
}

fn run_preprocess(matches: &ArgMatches) -> Result<(), String> {
    let config = match PreprocessConfig::from_matches(matches) {
        Ok(config) => config,
        Err(e) => {
            // no log file yet
            let _ = logging::init_stderr();
            return Err(e.to_string());
        }
    };
    if let Err(e) = logging::init_with_logfile(&config.logfile) {
        eprintln!("{}", e);
        process::exit(1);
    }

    let summary = match pipeline::run(&config) {
        Ok(summary) => summary,
        // logged by the pipeline
        Err(_) => process::exit(1),
    };
    println!(
        "Wrote {} ({} variables, {} time steps from {} files)",
        summary.store_path.display(),
        summary.variables.len(),
        summary.time_steps,
        summary.input_files
    );
    Ok(())
}

fn run_inspector(matches: &ArgMatches) -> Result<(), String> {
    let _ = logging::init_stderr();
    let config = InspectConfig::from_matches(matches).map_err(|e| e.to_string())?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_inspect(&config, &mut out).map_err(|e| e.to_string())
}
