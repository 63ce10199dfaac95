//! restless - Domain-first API discovery.
//!
//! CLI entry point.

use clap::Parser;
use restless::output::ConsoleOutput;
use restless::{Commands, Config, DiscoverConfig, Discoverer, DoctorConfig, ProfileWriter};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Exit code for hard errors (invalid input, unusable configuration).
const EXIT_HARD_ERROR: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Set up logging
    let filter = match &config.command {
        Commands::Discover(discover) if discover.debug || config.verbose => {
            EnvFilter::new("restless=debug,info")
        }
        Commands::Discover(discover) if discover.quiet || discover.json => EnvFilter::new("restless=warn"),
        _ if config.verbose => EnvFilter::new("restless=debug,info"),
        _ => EnvFilter::new("restless=info,warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match config.command.clone() {
        Commands::Discover(discover_config) => match run_discover(discover_config, &config).await {
            Ok(code) | Err(code) => ExitCode::from(code),
        },
        Commands::Doctor(doctor_config) => {
            run_doctor(doctor_config);
            ExitCode::SUCCESS
        }
    }
}

async fn run_discover(discover_config: DiscoverConfig, global_config: &Config) -> Result<u8, u8> {
    let console = ConsoleOutput::new(
        global_config.verbose || discover_config.debug,
        discover_config.json,
        discover_config.quiet,
    );

    // Resolve the profile target before spending any budget
    let profile = match discover_config.save_profile.as_deref() {
        Some(name) => {
            let writer = ProfileWriter::from_override(discover_config.profile_dir.clone());
            if let Err(e) = writer.path_for(name) {
                error!("{}", e);
                return Err(EXIT_HARD_ERROR);
            }
            Some((writer, name.to_string()))
        }
        None => None,
    };

    let discoverer = Discoverer::new(discover_config.options());
    console.print_discover_start(discover_config.domain.trim());

    let spinner = console.create_spinner("Gathering evidence...");
    let result = discoverer.discover(&discover_config.domain).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let finding = match result {
        Ok(f) => f,
        Err(e) => {
            error!("Discovery failed: {}", e);
            return Err(EXIT_HARD_ERROR);
        }
    };

    if let Some((writer, name)) = profile {
        match writer.write(&name, &finding, &discover_config.profile_options()) {
            Ok(path) => console.print_profile_saved(&path, &name, &finding),
            Err(e) => {
                error!("Failed to save profile: {}", e);
                return Err(EXIT_HARD_ERROR);
            }
        }
    }

    console.print_finding(&finding);

    Ok(finding.outcome().exit_code())
}

fn run_doctor(doctor_config: DoctorConfig) {
    let console = ConsoleOutput::default();
    let writer = ProfileWriter::from_override(doctor_config.profile_dir);

    console.print_info(&format!("restless {}", env!("CARGO_PKG_VERSION")));
    console.print_info(&format!("Profile dir: {}", writer.dir().display()));

    match writer.list() {
        Ok(names) if names.is_empty() => {
            console.print_info("No saved profiles yet.");
            console.print_info("Tip: run `restless discover openai.com --save-profile openai` to create one.");
        }
        Ok(names) => console.print_info(&format!("Profiles: {}", names.join(", "))),
        Err(e) => error!("Cannot read profile dir: {}", e),
    }

    if std::env::var_os(restless::profile::TOKEN_ENV_VAR).is_none() {
        console.print_info(&format!(
            "{} is not set; saved profiles reference it for bearer auth.",
            restless::profile::TOKEN_ENV_VAR
        ));
    }
}
