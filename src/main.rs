mod ai;
mod chat;
mod commit;
mod config;
mod context;
mod hook;
mod journal;
mod pipeline;
mod sections;
mod telemetry;
mod window;
mod workspace;

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};

use context::HookTrigger;
use pipeline::{RunOutcome, Runner};

#[derive(Parser)]
#[command(
    name = "daybook",
    version,
    about = "Turns commits into a narrative developer journal"
)]
struct Cli {
    /// Run as if started in this directory.
    #[arg(long, global = true, value_name = "PATH")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install the post-commit hook and seed the configuration.
    Install,
    /// Show hook, journal, and chat store health for this repository.
    Status,
    /// Generate a journal entry for a commit (HEAD by default).
    Generate {
        /// Commit hash or revision to journal.
        #[arg(long)]
        commit: Option<String>,
        /// Log to the data directory instead of stderr (hook use).
        #[arg(long, hide = true)]
        background: bool,
    },
    /// Git hook entry points; not intended for direct use.
    #[command(subcommand)]
    Hook(HookCommand),
}

#[derive(Subcommand)]
enum HookCommand {
    /// Invoked by the post-commit shim.
    PostCommit,
}

fn main() {
    let cli = Cli::parse();
    let cwd = match &cli.dir {
        Some(dir) => dir.clone(),
        None => match env::current_dir() {
            Ok(cwd) => cwd,
            Err(err) => {
                eprintln!("daybook: error: cannot determine working directory: {err}");
                process::exit(1);
            }
        },
    };

    match cli.command {
        Command::Hook(HookCommand::PostCommit) => {
            // Exits zero no matter what; a commit must never fail here.
            telemetry::init();
            hook::run_post_commit(&cwd);
        }
        Command::Install => exit_on_error(run_install(&cwd)),
        Command::Status => exit_on_error(run_status(&cwd)),
        Command::Generate { commit, background } => {
            exit_on_error(run_generate(&cwd, commit.as_deref(), background))
        }
    }
}

fn exit_on_error(result: Result<()>) {
    if let Err(err) = result {
        eprintln!("daybook: error: {err:#}");
        process::exit(1);
    }
}

fn run_install(cwd: &Path) -> Result<()> {
    telemetry::init();
    let runner = Runner::open(cwd, HookTrigger::Manual)?;
    let hook_path = hook::install(cwd)?;
    println!("post-commit hook installed at {}", hook_path.display());
    println!(
        "configuration at {}",
        runner.data_dir().join(config::FILENAME).display()
    );
    Ok(())
}

fn run_status(cwd: &Path) -> Result<()> {
    telemetry::init();
    let mut stdout = io::stdout();
    run_status_inner(cwd, &mut stdout)
}

fn run_status_inner(cwd: &Path, out: &mut dyn Write) -> Result<()> {
    if git2::Repository::discover(cwd).is_err() {
        writeln!(out, "not inside a git repository")?;
        return Ok(());
    }
    let runner = Runner::open(cwd, HookTrigger::Manual)?;

    writeln!(out, "repository: {}", runner.workdir().display())?;
    let hook_state = if hook::installed(runner.repo()) {
        "installed"
    } else {
        "not installed (run `daybook install`)"
    };
    writeln!(out, "hook: {hook_state}")?;
    writeln!(out, "journal: {}", runner.journal_root().display())?;

    let config = runner.config();
    if config.ai.enabled {
        writeln!(out, "ai: enabled (model {})", config.ai.model)?;
    } else {
        writeln!(out, "ai: disabled")?;
    }

    match config.chat.storage_root_path() {
        None => writeln!(out, "chat: no storage root configured")?,
        Some(root) => match workspace::locate(Some(&root), runner.repo()) {
            Ok(handle) => writeln!(
                out,
                "chat: workspace {} ({}, confidence {:.1})",
                handle.folder.display(),
                handle.match_type.label(),
                handle.confidence
            )?,
            Err(err) => writeln!(out, "chat: {err}")?,
        },
    }
    Ok(())
}

fn run_generate(cwd: &Path, rev: Option<&str>, background: bool) -> Result<()> {
    if background {
        let log_path = match git2::Repository::discover(cwd)
            .ok()
            .and_then(|repo| repo.workdir().map(Path::to_path_buf))
        {
            Some(workdir) => workdir
                .join(config::DATA_DIR)
                .join(telemetry::LOG_FILENAME),
            None => env::temp_dir().join(telemetry::LOG_FILENAME),
        };
        telemetry::init_background(&log_path);
    } else {
        telemetry::init();
    }

    let trigger = if background {
        HookTrigger::PostCommit
    } else {
        HookTrigger::Manual
    };
    let runner = Runner::open(cwd, trigger)?;
    match runner.run(rev)? {
        RunOutcome::Written {
            path,
            generated,
            fallbacks,
        } => {
            if !background {
                println!("journal entry written to {}", path.display());
                if fallbacks > 0 {
                    println!("({generated} sections generated, {fallbacks} fell back)");
                }
            }
        }
        RunOutcome::SkippedMerge => {
            if !background {
                println!("merge commit, no entry written");
            }
        }
    }
    Ok(())
}
