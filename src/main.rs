// src/main.rs
// runcell - Execution session manager for notebook-style code cells

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::AsyncBufReadExt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use runcell::config::RuncellConfig;
use runcell::export;
use runcell::{render_notebook, render_script, CellExecutor};

#[derive(Parser)]
#[command(name = "runcell")]
#[command(about = "Execution session manager for notebook-style code cells")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a file's contents as one cell
    Run {
        /// Source file to execute
        file: PathBuf,

        /// Cell identifier (defaults to a generated one)
        #[arg(long)]
        id: Option<String>,

        /// Interpreter command (overrides config)
        #[arg(short, long)]
        interpreter: Option<String>,

        /// Wait budget in seconds per execute/resume call
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Working directory for the session
        #[arg(short, long)]
        workdir: Option<PathBuf>,
    },

    /// Render a JSON cell array as a shareable document
    Export {
        /// Path to the JSON cell array
        cells: PathBuf,

        /// Output document format
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Script)]
        format: ExportFormat,
    },

    /// Install a requirements manifest with the configured installer
    Install {
        /// Requirements file to install
        file: PathBuf,

        /// Working directory for the installer
        #[arg(short, long)]
        workdir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Script,
    Notebook,
}

async fn run_cell(
    file: PathBuf,
    id: Option<String>,
    interpreter: Option<String>,
    timeout: Option<u64>,
    workdir: Option<PathBuf>,
) -> Result<i32> {
    let code = tokio::fs::read_to_string(&file).await?;

    let mut config = RuncellConfig::load();
    if let Some(interpreter) = interpreter {
        config.interpreter.command = Some(interpreter);
    }
    if let Some(timeout) = timeout {
        config.execution.timeout_secs = Some(timeout);
    }
    if let Some(workdir) = workdir {
        config.execution.workdir = Some(workdir);
    }

    let executor = Arc::new(CellExecutor::new(config.to_executor_config()));
    let cell_id = id.unwrap_or_else(|| format!("cell_{}", Uuid::new_v4()));

    // Ctrl-C kills the session instead of the CLI
    let canceller = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel_all().await;
        }
    });

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut result = executor.execute(&cell_id, &code).await;
    while result.waiting_for_input {
        let prompt = result.input_prompt.as_deref().unwrap_or(">");
        eprint!("{prompt} ");

        let mut line = String::new();
        if stdin.read_line(&mut line).await? == 0 {
            // No more input to give; stop the session
            executor.cancel(&cell_id).await;
            break;
        }
        result = executor
            .resume(&cell_id, line.trim_end_matches(['\r', '\n']))
            .await;
    }

    print!("{}", result.output);
    std::io::stdout().flush()?;
    Ok(if result.success { 0 } else { 1 })
}

async fn run_export(cells: PathBuf, format: ExportFormat) -> Result<()> {
    let cells = export::load_cells(&cells).await?;
    let document = match format {
        ExportFormat::Script => render_script(&cells),
        ExportFormat::Notebook => render_notebook(&cells),
    };
    print!("{document}");
    if !document.ends_with('\n') {
        println!();
    }
    Ok(())
}

async fn run_install(file: PathBuf, workdir: Option<PathBuf>) -> Result<i32> {
    let requirements = tokio::fs::read_to_string(&file).await?;

    let mut config = RuncellConfig::load();
    if let Some(workdir) = workdir {
        config.execution.workdir = Some(workdir);
    }

    let executor = CellExecutor::new(config.to_executor_config());
    let result = executor.install_requirements(&requirements).await;

    print!("{}", result.output);
    std::io::stdout().flush()?;
    Ok(if result.success { 0 } else { 1 })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".runcell/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up logging based on command
    let log_level = if cli.debug {
        Level::DEBUG
    } else {
        match &cli.command {
            Commands::Export { .. } => Level::WARN, // Quiet, stdout carries the document
            Commands::Run { .. } | Commands::Install { .. } => Level::INFO,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let exit_code = match cli.command {
        Commands::Run {
            file,
            id,
            interpreter,
            timeout,
            workdir,
        } => run_cell(file, id, interpreter, timeout, workdir).await?,
        Commands::Export { cells, format } => {
            run_export(cells, format).await?;
            0
        }
        Commands::Install { file, workdir } => run_install(file, workdir).await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
