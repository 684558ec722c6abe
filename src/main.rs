//! Skysync CLI - background directory-to-cloud sync daemon
//!
//! Usage: skysync <command> [arguments]

mod cli;
mod control_cmd;
mod jobs_cmd;
mod start_cmd;
mod status_cmd;
mod version;

use std::process::ExitCode;

use cli::{parse_args, Command};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Handle help and version flags before parsing
    if args.len() >= 2 {
        match args[1].as_str() {
            "--help" | "-h" => {
                cli::print_short_usage();
                return ExitCode::SUCCESS;
            }
            "--help-full" | "-H" => {
                cli::print_full_usage();
                return ExitCode::SUCCESS;
            }
            "--version" | "-V" => {
                println!("{}", version::version());
                return ExitCode::SUCCESS;
            }
            _ => {}
        }
    }

    if args.len() < 2 {
        cli::print_short_usage();
        return ExitCode::from(1);
    }

    let command = match parse_args() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            cli::print_short_usage();
            return ExitCode::from(1);
        }
    };

    let result = match command {
        Command::Start {
            config_path,
            state_dir,
            once,
            mirror_dir,
        } => start_cmd::run_start(config_path, state_dir, once, mirror_dir),
        Command::Stop { state_dir } => control_cmd::run_stop(state_dir),
        Command::Pause { state_dir } => control_cmd::run_pause(state_dir),
        Command::Resume { state_dir } => control_cmd::run_resume(state_dir),
        Command::Reconcile { state_dir } => control_cmd::run_reconcile(state_dir),
        Command::ConfigCheck { state_dir } => control_cmd::run_config_check(state_dir),
        Command::Status {
            state_dir,
            output_format,
        } => status_cmd::run_status(state_dir, output_format),
        Command::Jobs {
            state_dir,
            status,
            limit,
            output_format,
        } => jobs_cmd::run_jobs(state_dir, status, limit, output_format),
        Command::ResetFailed { state_dir } => jobs_cmd::run_reset_failed(state_dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
