//! ckpt - command-line interface for checkpointed project workspaces.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::App;

#[derive(Parser)]
#[command(name = "ckpt")]
#[command(about = "Checkpoints and restores for project workspaces", long_about = None)]
#[command(version)]
struct Cli {
    /// Data root holding repositories and checkpoints
    #[arg(long, global = true, env = "CKPT_ROOT", default_value = ".ckpt-data")]
    root: PathBuf,

    /// Repository owner
    #[arg(long, global = true, env = "CKPT_OWNER", default_value = "default")]
    owner: String,

    /// Repository project
    #[arg(long, global = true, env = "CKPT_PROJECT")]
    project: Option<String>,

    /// Print results as JSON response envelopes
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config.toml into the data root
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Manage repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Commit the working tree
    Commit {
        /// Commit message
        #[arg(short, long, default_value = "")]
        message: String,
        /// Only commit these paths (relative to the working tree)
        #[arg(short, long = "file")]
        files: Vec<PathBuf>,
    },
    /// Manage checkpoints
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },
    /// Restore the working tree from a checkpoint
    Restore {
        /// Checkpoint ID (12 hex characters)
        checkpoint_id: String,
        /// Skip the safety checkpoint of the current state
        #[arg(long)]
        no_backup: bool,
    },
    /// Digest a chat transcript into a migration checkpoint
    Migrate {
        /// Session the context comes from
        #[arg(long)]
        old: String,
        /// Session the context goes to
        #[arg(long)]
        new: String,
        /// JSON file holding an array of {role, content, timestamp}
        #[arg(long)]
        transcript: PathBuf,
    },
    /// Show commit history
    History {
        /// Maximum number of commits to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Number of newest commits to skip
        #[arg(long, default_value = "0")]
        skip: usize,
    },
    /// Check repository consistency
    Verify,
    /// Reap abandoned directories and unreachable objects
    Gc {
        /// Show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
        /// Skip grace period, delete immediately
        #[arg(long)]
        aggressive: bool,
        /// Also sweep the repository's version-control objects
        #[arg(long)]
        objects: bool,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Check that storage is present and writable
    Health,
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Create and seed a repository
    Create {
        /// Human-readable name
        #[arg(long, default_value = "")]
        name: String,
        /// Description for the README
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Show repository metadata
    Show,
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// Snapshot the working tree
    Create {
        /// Checkpoint name
        #[arg(default_value = "")]
        name: String,
        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
        /// JSON file stored as the checkpoint's context
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// List checkpoints in creation order
    List,
    /// Show one checkpoint
    Show {
        /// Checkpoint ID (12 hex characters)
        checkpoint_id: String,
    },
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = cli.command {
        return commands::init::run(&cli.root, force, cli.json);
    }

    let app = App::load(&cli.root, &cli.owner, cli.project, cli.json)?;
    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Repo { command } => match command {
            RepoCommands::Create { name, description } => {
                commands::repo::create(&app, &name, &description)
            }
            RepoCommands::Show => commands::repo::show(&app),
        },
        Commands::Commit { message, files } => commands::commit::run(&app, &message, &files),
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Create {
                name,
                description,
                context,
            } => commands::checkpoint::create(&app, &name, &description, context.as_deref()),
            CheckpointCommands::List => commands::checkpoint::list(&app),
            CheckpointCommands::Show { checkpoint_id } => {
                commands::checkpoint::show(&app, &checkpoint_id)
            }
        },
        Commands::Restore {
            checkpoint_id,
            no_backup,
        } => commands::restore::run(&app, &checkpoint_id, no_backup),
        Commands::Migrate {
            old,
            new,
            transcript,
        } => commands::migrate::run(&app, &old, &new, &transcript),
        Commands::History { limit, skip } => commands::history::run(&app, limit, skip),
        Commands::Verify => commands::verify::run(&app),
        Commands::Gc {
            dry_run,
            aggressive,
            objects,
            yes,
        } => commands::gc::run(&app, dry_run, aggressive, objects, yes),
        Commands::Health => commands::health::run(&app),
    }
}

fn main() -> ExitCode {
    // Respects RUST_LOG (e.g. RUST_LOG=ckpt_core=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            commands::report_error(&err, json);
            ExitCode::FAILURE
        }
    }
}
