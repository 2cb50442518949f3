//! `assessbank` command line entry point.
//!
//! # Responsibility
//! - Map CI invocations (changed files plus a commit hash) onto the core
//!   reconciliation engine.
//! - Own process concerns: argument parsing, logging setup, exit codes.
//!
//! # Invariants
//! - Exit code is 0 on success and 1 on any usage, validation or engine
//!   error. Rename failures after a committed batch are printed but do not
//!   change the exit code.

use anyhow::{bail, Context, Result};
use assessbank_core::{
    collect_question_files, default_log_level, init_logging, open_db, AssessmentUpdater,
    BankConfig, ChangeSet, FrontmatterParser, RenameReport, UpdateReport, DEFAULT_CONFIG_FILE,
};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_DB_FILE: &str = "assessbank.sqlite3";
const DEFAULT_LOG_SUBDIR: &str = ".assessbank/logs";

#[derive(Parser, Debug)]
#[command(name = "assessbank")]
#[command(about = "Versioned assessment bank maintained from question files")]
#[command(version)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "ASSESSBANK_DB", default_value = DEFAULT_DB_FILE, global = true)]
    db: PathBuf,

    /// Bank configuration (allowed tags and question types)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config_file: PathBuf,

    /// Root of the question repository
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Log level (trace|debug|info|warn|error); defaults per build mode
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Absolute log directory; defaults to `<cwd>/.assessbank/logs`
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse question files and report every problem without touching the store
    Validate {
        /// Validate every question file under --root
        #[arg(long)]
        all: bool,
        /// Files to validate
        files: Vec<String>,
    },
    /// Apply one commit's file changes and create new assessment generations
    Upload(UploadArgs),
    /// Drop all stored data and rebuild it from every question file
    Reset {
        /// Commit hash recorded on the rebuilt assessments
        #[arg(long)]
        commit: String,
    },
    /// Replace a commit hash on every assessment (after a rebase or squash)
    Rehash {
        /// Hash to replace
        #[arg(long)]
        commit: String,
        /// Replacement hash
        #[arg(long)]
        new_commit: String,
    },
}

#[derive(clap::Args, Debug)]
struct UploadArgs {
    /// Newly added question files
    #[arg(long, num_args = 1..)]
    added: Vec<String>,
    /// Deleted question files
    #[arg(long, num_args = 1..)]
    deleted: Vec<String>,
    /// Modified question files
    #[arg(long, num_args = 1..)]
    updated: Vec<String>,
    /// Commit hash of the change
    #[arg(long)]
    commit: String,
    /// The bank configuration changed in this commit
    #[arg(long)]
    config: bool,
}

impl UploadArgs {
    fn into_change_set(self) -> (String, ChangeSet) {
        (
            self.commit,
            ChangeSet {
                added: self.added,
                deleted: self.deleted,
                modified: self.updated,
                config_changed: self.config,
            },
        )
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // stderr is the only channel left if this fails
            err.print().ok();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    setup_logging(&args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_exit module=cli status=error error={err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(args: &Args) {
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    let log_dir = match &args.log_dir {
        Some(dir) => dir.clone(),
        None => match std::env::current_dir() {
            Ok(cwd) => cwd.join(DEFAULT_LOG_SUBDIR),
            Err(err) => {
                eprintln!("warning: logging disabled, cannot resolve working directory: {err}");
                return;
            }
        },
    };
    // A broken log setup must not block a batch; say so and carry on.
    if let Err(err) = init_logging(&level, &log_dir.to_string_lossy()) {
        eprintln!("warning: logging disabled: {err}");
    }
}

fn run(args: Args) -> Result<()> {
    let config = BankConfig::load(&args.config_file)
        .with_context(|| format!("failed to load config `{}`", args.config_file.display()))?;

    match args.command {
        Commands::Validate { all, files } => validate(&config, &args.root, all, files),
        Commands::Upload(upload) => {
            let (commit, changes) = upload.into_change_set();
            if changes.is_empty() {
                bail!("upload needs at least one of --added, --deleted, --updated or --config");
            }
            let mut conn = open_db(&args.db)
                .with_context(|| format!("failed to open database `{}`", args.db.display()))?;
            let report = AssessmentUpdater::new(&config, commit)
                .update_assessments(&mut conn, &changes)
                .context("upload failed, no changes were stored")?;
            print_report(&report);
            Ok(())
        }
        Commands::Reset { commit } => {
            let mut conn = open_db(&args.db)
                .with_context(|| format!("failed to open database `{}`", args.db.display()))?;
            let report = AssessmentUpdater::new(&config, commit)
                .reset(&mut conn, &args.root)
                .context("reset failed, previous data is untouched")?;
            print_report(&report);
            Ok(())
        }
        Commands::Rehash { commit, new_commit } => {
            let mut conn = open_db(&args.db)
                .with_context(|| format!("failed to open database `{}`", args.db.display()))?;
            let changed = AssessmentUpdater::new(&config, commit)
                .update_hash(&mut conn, &new_commit)
                .context("rehash failed")?;
            println!("rewrote commit hash on {changed} assessment(s)");
            Ok(())
        }
    }
}

fn validate(config: &BankConfig, root: &Path, all: bool, files: Vec<String>) -> Result<()> {
    let mut targets = files;
    if all {
        let scanned = collect_question_files(root)
            .with_context(|| format!("failed to scan `{}`", root.display()))?;
        targets.extend(
            scanned
                .into_iter()
                .map(|path| path.to_string_lossy().into_owned()),
        );
    }
    if targets.is_empty() {
        bail!("nothing to validate; pass files or --all");
    }

    let parser = FrontmatterParser::new(config);
    let mut failures = 0usize;
    for path in &targets {
        if let Err(err) = parser.parse_file(path) {
            failures += 1;
            eprintln!("{err}");
        }
    }
    info!(
        "event=validate module=cli status={} files={} failures={}",
        if failures == 0 { "ok" } else { "error" },
        targets.len(),
        failures
    );
    if failures > 0 {
        bail!("{failures} of {} question file(s) failed validation", targets.len());
    }
    println!("{} question file(s) valid", targets.len());
    Ok(())
}

fn print_report(report: &UpdateReport) {
    let outcome = &report.outcome;
    println!(
        "created {} assessment(s), retired {}, new assignments {}",
        outcome.created.len(),
        outcome.retired.len(),
        outcome.new_assignment_ids.len()
    );
    print_renames(&report.renames);
}

fn print_renames(renames: &RenameReport) {
    for (from, to) in &renames.renamed {
        println!("renamed {from} -> {to}");
    }
    for failure in &renames.failures {
        eprintln!("warning: {failure}");
    }
}
