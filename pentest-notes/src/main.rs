//! pentest-notes - engagement notebook for penetration testers
//!
//! A thin command-line front end over `pentest-notes-core`. Every command
//! works against the active engagement unless it says otherwise.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Data: $XDG_DATA_HOME/pentest-notes/ (~/.local/share/pentest-notes/), or $PENTEST_NOTES_DIR
//! - Logs: $XDG_STATE_HOME/pentest-notes/ (~/.local/state/pentest-notes/)
//! - Config: $XDG_CONFIG_HOME/pentest-notes/config.toml (~/.config/pentest-notes/config.toml)

mod output;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pentest_notes_core::{CloseStatus, CommandCapture, Config, EngagementStore};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pentest-notes")]
#[command(about = "Structured notes for penetration testing engagements")]
#[command(version)]
struct Args {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an engagement and make it active
    Create {
        /// Client or target name
        target: String,

        /// In-scope network, host or domain (repeatable)
        #[arg(long = "scope", value_name = "SCOPE")]
        scope: Vec<String>,

        /// Rules of engagement
        #[arg(long = "roe", value_name = "TEXT", default_value = "")]
        rules_of_engagement: String,
    },

    /// List all engagements
    List,

    /// Show the active engagement
    Status,

    /// Make an existing engagement active again
    Resume {
        /// Engagement id
        id: String,
    },

    /// Close the active engagement
    Close {
        /// completed or paused
        #[arg(long, default_value = "completed")]
        status: CloseStatus,

        /// Replace the executive summary
        #[arg(long)]
        summary: Option<String>,
    },

    /// Parse tool output into the active engagement
    Ingest {
        /// Tool that produced the file (nmap, nuclei)
        tool: String,

        /// Output file to parse
        file: PathBuf,
    },

    /// Record a command that was run, with its captured output
    Log {
        /// The command line
        #[arg(long)]
        command: String,

        /// Tool name (defaults to the command's program name)
        #[arg(long)]
        tool: Option<String>,

        /// Target of the command
        #[arg(long)]
        target: Option<String>,

        /// Exit status
        #[arg(long, allow_negative_numbers = true)]
        exit_code: Option<i32>,

        /// Wall time in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,

        /// When the command started (RFC 3339)
        #[arg(long)]
        started_at: Option<DateTime<Utc>>,

        /// File holding the command's output
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also parse the output with the tool's parser
        #[arg(long)]
        ingest: bool,
    },

    /// Rebuild the engagement index from the records on disk
    Reindex,
}

#[derive(Serialize)]
struct ResumeOutput {
    engagement: pentest_notes_core::EngagementRecord,
    open_todos: usize,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        tracing::error!(error = %format!("{:#}", e), "command failed");
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = pentest_notes_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    let store = EngagementStore::open(&config);
    tracing::debug!(root = %store.paths().root().display(), "pentest-notes starting");

    let json = args.json;
    match args.command {
        Command::Create {
            target,
            scope,
            rules_of_engagement,
        } => {
            let record = store
                .create_engagement(&target, scope, &rules_of_engagement)
                .context("failed to create engagement")?;
            if json {
                return output::json(&record);
            }
            output::created(&record, &store.paths().report_file(&record.id));
        }

        Command::List => {
            let listing = store
                .list_engagements()
                .context("failed to list engagements")?;
            if json {
                return output::json(&listing);
            }
            output::listing(&listing);
        }

        Command::Status => {
            let summary = store.engagement_status()?;
            if json {
                return output::json(&summary);
            }
            output::status(&summary);
        }

        Command::Resume { id } => {
            let (engagement, open_todos) = store
                .resume_engagement(&id)
                .with_context(|| format!("failed to resume {}", id))?;
            if json {
                return output::json(&ResumeOutput {
                    engagement,
                    open_todos,
                });
            }
            println!(
                "Resumed {} ({}), {} open TODO(s)",
                engagement.id, engagement.status, open_todos
            );
        }

        Command::Close { status, summary } => {
            let outcome = store.close_engagement(status, summary.as_deref())?;
            if json {
                return output::json(&outcome);
            }
            println!("Closed {} as {}", outcome.id, outcome.status);
        }

        Command::Ingest { tool, file } => {
            let report = store
                .ingest_file(&tool, &file)
                .with_context(|| format!("failed to ingest {}", file.display()))?;
            if json {
                return output::json(&report);
            }
            output::ingest(&report);
        }

        Command::Log {
            command,
            tool,
            target,
            exit_code,
            duration_ms,
            started_at,
            output: output_file,
            ingest,
        } => {
            let outcome = store
                .capture_command(CommandCapture {
                    command,
                    tool,
                    target,
                    started_at,
                    duration_ms,
                    exit_code,
                    output: output_file,
                    source: None,
                    ingest,
                })
                .context("failed to log command")?;
            if json {
                return output::json(&outcome);
            }
            output::captured(&outcome);
        }

        Command::Reindex => {
            let report = store
                .reconcile_index()
                .context("failed to reconcile index")?;
            if json {
                return output::json(&report);
            }
            println!(
                "Index reconciled: {} refreshed, {} removed",
                report.refreshed,
                report.removed.len()
            );
            for id in &report.removed {
                println!("  removed {}", id);
            }
            for path in &report.skipped {
                println!("  skipped unreadable {}", path.display());
            }
        }
    }

    Ok(())
}
