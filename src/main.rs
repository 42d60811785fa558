use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use logharvest::cli;
use logharvest::collect::CollectOptions;
use logharvest::config::{Config, PathRemap};
use logharvest::extract::ExtractOptions;
use logharvest::runner::MavenRunner;

/// logharvest: pair Java log statements with the output they produce under
/// unit tests.
#[derive(Parser)]
#[command(name = "logharvest", version, about)]
struct Cli {
    /// TOML config file. Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Parent directory of all run results.
    #[arg(long, global = true)]
    results_dir: Option<PathBuf>,

    /// Run name; results go to <results-dir>/<execute-id>.
    #[arg(long, global = true)]
    execute_id: Option<String>,

    /// trace, debug, info, warn or error.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the Maven test modules and test classes under a code root.
    Discover {
        /// Directory searched for modules with pom.xml and src/test.
        code_root: PathBuf,

        /// Project list JSON to write, as read by `collect`.
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Run every listed test once and keep its coverage report.
    Collect {
        /// JSON list of {project_dir, test_list}.
        projects: PathBuf,

        /// Directory the project paths are relative to.
        #[arg(long)]
        code_root: PathBuf,

        /// Where reports are saved.
        #[arg(long)]
        data_dir: PathBuf,

        /// Progress ledger (default: <data-dir>/execution_result.jsonl).
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Number of projects processed in parallel.
        #[arg(long)]
        workers: Option<usize>,

        /// Re-run tests already in the ledger.
        #[arg(long)]
        no_resume: bool,
    },

    /// Find covered log statements and write work items.
    Extract {
        /// Function catalog JSON.
        #[arg(long)]
        catalog: PathBuf,

        /// Output of `collect`.
        #[arg(long)]
        data_dir: PathBuf,

        /// Checkout root mirroring the layout of the data directory.
        #[arg(long)]
        source_code_dir: PathBuf,

        /// Work item JSON to write.
        #[arg(long, short)]
        output: PathBuf,

        /// Instrumentation tag (default: [SUPER TAG]).
        #[arg(long)]
        tag: Option<String>,

        /// Rewrite a host path prefix in the work items, as FROM=TO.
        #[arg(long, value_parser = parse_remap)]
        path_remap: Option<PathRemap>,
    },

    /// Mutate, test, harvest and revert every work item.
    Execute {
        /// Work item JSON written by `extract`.
        work_file: PathBuf,

        /// Number of build roots processed in parallel.
        #[arg(long)]
        workers: Option<usize>,

        /// Re-run items already in the ledger.
        #[arg(long)]
        no_resume: bool,

        /// Save the output of failed test runs.
        #[arg(long)]
        record_error: bool,

        #[arg(long)]
        tag: Option<String>,
    },

    /// Revert the mutation recorded under a uuid.
    Reverse { uuid: String },

    /// List mutations that were never reverted.
    Pending {
        /// Revert them all.
        #[arg(long)]
        recover: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = cli.results_dir {
        config.results_dir = dir;
    }
    if let Some(id) = cli.execute_id {
        config.execute_id = id;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    let layout = config.layout();

    let output = match cli.command {
        Commands::Discover { code_root, output } => {
            init_tracing(&config.log_level, &layout.log_dir(), "discover")?;
            cli::cmd_discover(&code_root, &output)?
        }
        Commands::Collect {
            projects,
            code_root,
            data_dir,
            ledger,
            workers,
            no_resume,
        } => {
            init_tracing(&config.log_level, &layout.log_dir(), "collect")?;
            let options = CollectOptions {
                ledger_path: ledger.unwrap_or_else(|| data_dir.join("execution_result.jsonl")),
                code_root,
                data_dir,
                workers: workers.unwrap_or(config.workers),
                resume: config.resume && !no_resume,
            };
            let runner = MavenRunner::new(config.collect_command.clone(), config.build_command.clone())?;
            cli::cmd_collect(&projects, &options, &runner)?
        }
        Commands::Extract {
            catalog,
            data_dir,
            source_code_dir,
            output,
            tag,
            path_remap,
        } => {
            init_tracing(&config.log_level, &layout.log_dir(), "extract")?;
            let options = ExtractOptions {
                data_dir,
                source_code_dir,
                tag: tag.unwrap_or(config.tag.clone()),
                remap: path_remap.or(config.path_remap.clone()),
            };
            cli::cmd_extract(&catalog, &options, &output)?
        }
        Commands::Execute {
            work_file,
            workers,
            no_resume,
            record_error,
            tag,
        } => {
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(tag) = tag {
                config.tag = tag;
            }
            config.resume = config.resume && !no_resume;
            config.record_error = config.record_error || record_error;
            config.validate()?;

            init_tracing(&config.log_level, &layout.log_dir(), "execute")?;
            let runner = MavenRunner::new(config.test_command.clone(), config.build_command.clone())?;
            cli::cmd_execute(&work_file, &config, &runner)?
        }
        Commands::Reverse { uuid } => {
            init_tracing(&config.log_level, &layout.log_dir(), "reverse")?;
            cli::cmd_reverse(&layout, &uuid)?
        }
        Commands::Pending { recover } => {
            init_tracing(&config.log_level, &layout.log_dir(), "pending")?;
            cli::cmd_pending(&layout, recover)?
        }
    };

    print!("{}", output);
    Ok(())
}

/// Log to stderr and to a timestamped file under `log_dir`.
fn init_tracing(level: &str, log_dir: &Path, command: &str) -> Result<()> {
    let level: tracing::Level = level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", level))?;
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let path = log_dir.join(format!(
        "{}_{}.log",
        command,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = fs::File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr.and(Mutex::new(file)))
        .with_ansi(false)
        .with_max_level(level)
        .init();
    tracing::info!(log = %path.display(), "logging initialised");
    Ok(())
}

fn parse_remap(value: &str) -> std::result::Result<PathRemap, String> {
    let (from, to) = value
        .split_once('=')
        .ok_or_else(|| format!("expected FROM=TO, got '{}'", value))?;
    Ok(PathRemap {
        from: from.to_string(),
        to: to.to_string(),
    })
}
