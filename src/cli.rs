//! CLI argument parsing for Skysync
//!
//! Defines the Command enum and parse_args() function for all CLI commands.

use anyhow::Result;
use skysync::store::jobs::JobStatus;
use skysync::{daemon, OutputFormat};
use std::path::PathBuf;

pub fn print_short_usage() {
    eprintln!("Skysync - background directory-to-cloud sync daemon");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  skysync <command> [arguments]");
    eprintln!("  skysync --help | --help-full | --version");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  start           Run the sync daemon in the foreground");
    eprintln!("  stop            Ask the running daemon to shut down");
    eprintln!("  pause           Freeze job processing (in-flight jobs finish)");
    eprintln!("  resume          Resume job processing");
    eprintln!("  reconcile       Re-scan every sync dir from scratch");
    eprintln!("  config-check    Ask the daemon to re-read its config file");
    eprintln!("  status          Show daemon and job-queue state");
    eprintln!("  jobs            List sync jobs (default: failed ones)");
    eprintln!("  reset-failed    Clear failed jobs and trigger a reconcile");
    eprintln!();
    eprintln!("Run `skysync --help-full` for per-command arguments.");
}

pub fn print_full_usage() {
    print_short_usage();
    eprintln!();
    eprintln!("Global arguments:");
    eprintln!("  --state-dir <DIR>   State directory (default: {})",
        daemon::default_state_dir().display());
    eprintln!("  --output <FORMAT>   Output format: human (default), json (compact), or pretty (formatted)");
    eprintln!();
    eprintln!("Start arguments:");
    eprintln!("  --config <FILE>     Path to the JSON config file (required)");
    eprintln!("  --once              Scan, drain the job queue, then exit");
    eprintln!("  --mirror-dir <DIR>  Mirror the remote namespace into a local directory");
    eprintln!("                      instead of a real cloud client (demo/testing)");
    eprintln!();
    eprintln!("Jobs arguments:");
    eprintln!("  --status <STATUS>   PENDING, PROCESSING, SYNCED, or BLOCKED (default: BLOCKED)");
    eprintln!("  --all               List jobs in every status");
    eprintln!("  --limit <N>         Maximum rows to list (default: 50)");
}

#[derive(Debug)]
pub enum Command {
    Start {
        config_path: PathBuf,
        state_dir: PathBuf,
        once: bool,
        mirror_dir: Option<PathBuf>,
    },
    Stop {
        state_dir: PathBuf,
    },
    Pause {
        state_dir: PathBuf,
    },
    Resume {
        state_dir: PathBuf,
    },
    Reconcile {
        state_dir: PathBuf,
    },
    ConfigCheck {
        state_dir: PathBuf,
    },
    Status {
        state_dir: PathBuf,
        output_format: OutputFormat,
    },
    Jobs {
        state_dir: PathBuf,
        status: Option<JobStatus>,
        limit: i64,
        output_format: OutputFormat,
    },
    ResetFailed {
        state_dir: PathBuf,
    },
}

/// Parse CLI arguments into a Command.
///
/// `--version`/`-V` and the help flags are handled by `main` before this
/// runs.
pub fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        return Err(anyhow::anyhow!("Missing command"));
    }

    let command = &args[1];
    match command.as_str() {
        "start" => parse_start_args(&args[2..]),
        "stop" => parse_plain_args(&args[2..], "stop", |state_dir| Command::Stop { state_dir }),
        "pause" => parse_plain_args(&args[2..], "pause", |state_dir| Command::Pause { state_dir }),
        "resume" => {
            parse_plain_args(&args[2..], "resume", |state_dir| Command::Resume { state_dir })
        }
        "reconcile" => parse_plain_args(&args[2..], "reconcile", |state_dir| Command::Reconcile {
            state_dir,
        }),
        "config-check" => parse_plain_args(&args[2..], "config-check", |state_dir| {
            Command::ConfigCheck { state_dir }
        }),
        "status" => parse_status_args(&args[2..]),
        "jobs" => parse_jobs_args(&args[2..]),
        "reset-failed" => parse_plain_args(&args[2..], "reset-failed", |state_dir| {
            Command::ResetFailed { state_dir }
        }),
        _ => Err(anyhow::anyhow!("Unknown command: {}", command)),
    }
}

fn parse_start_args(args: &[String]) -> Result<Command> {
    let mut config_path: Option<PathBuf> = None;
    let mut state_dir = daemon::default_state_dir();
    let mut once = false;
    let mut mirror_dir: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config_path = Some(parse_path_arg(args, &mut i, "--config")?),
            "--state-dir" => state_dir = parse_path_arg(args, &mut i, "--state-dir")?,
            "--mirror-dir" => mirror_dir = Some(parse_path_arg(args, &mut i, "--mirror-dir")?),
            "--once" => {
                once = true;
                i += 1;
            }
            _ => return Err(anyhow::anyhow!("Unknown argument: {}", args[i])),
        }
    }

    let config_path = config_path.ok_or_else(|| anyhow::anyhow!("--config is required"))?;
    Ok(Command::Start {
        config_path,
        state_dir,
        once,
        mirror_dir,
    })
}

fn parse_plain_args(
    args: &[String],
    command: &str,
    build: impl FnOnce(PathBuf) -> Command,
) -> Result<Command> {
    let mut state_dir = daemon::default_state_dir();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--state-dir" => state_dir = parse_path_arg(args, &mut i, "--state-dir")?,
            _ => {
                return Err(anyhow::anyhow!(
                    "Unknown argument for {}: {}",
                    command,
                    args[i]
                ))
            }
        }
    }
    Ok(build(state_dir))
}

fn parse_status_args(args: &[String]) -> Result<Command> {
    let mut state_dir = daemon::default_state_dir();
    let mut output_format = OutputFormat::Human;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--state-dir" => state_dir = parse_path_arg(args, &mut i, "--state-dir")?,
            "--output" => {
                let value = parse_required_arg(args, &mut i, "--output")?;
                output_format = OutputFormat::parse(&value)?;
            }
            _ => return Err(anyhow::anyhow!("Unknown argument: {}", args[i])),
        }
    }

    Ok(Command::Status {
        state_dir,
        output_format,
    })
}

fn parse_jobs_args(args: &[String]) -> Result<Command> {
    let mut state_dir = daemon::default_state_dir();
    let mut status = Some(JobStatus::Blocked);
    let mut limit: i64 = 50;
    let mut output_format = OutputFormat::Human;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--state-dir" => state_dir = parse_path_arg(args, &mut i, "--state-dir")?,
            "--status" => {
                let value = parse_required_arg(args, &mut i, "--status")?;
                status = Some(
                    JobStatus::parse(&value)
                        .ok_or_else(|| anyhow::anyhow!("Invalid job status: {}", value))?,
                );
            }
            "--all" => {
                status = None;
                i += 1;
            }
            "--limit" => {
                let value = parse_required_arg(args, &mut i, "--limit")?;
                limit = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid --limit value: {}", value))?;
            }
            "--output" => {
                let value = parse_required_arg(args, &mut i, "--output")?;
                output_format = OutputFormat::parse(&value)?;
            }
            _ => return Err(anyhow::anyhow!("Unknown argument: {}", args[i])),
        }
    }

    Ok(Command::Jobs {
        state_dir,
        status,
        limit,
        output_format,
    })
}

fn parse_path_arg(args: &[String], i: &mut usize, flag: &str) -> Result<PathBuf> {
    let value = parse_required_arg(args, i, flag)?;
    Ok(PathBuf::from(value))
}

fn parse_required_arg(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    if *i + 1 >= args.len() {
        return Err(anyhow::anyhow!("{} requires an argument", flag));
    }
    let value = args[*i + 1].clone();
    *i += 2;
    Ok(value)
}
