//! scripthost - Run vault scripts as invocable actions.
//!
//! Usage:
//!   scripthost list              List invocable scripts
//!   scripthost actions           List registered actions
//!   scripthost exec <ID>         Execute one action
//!   scripthost run               Run the startup script and watch the scripts folder
//!   scripthost --help            Show help

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scripthost_core::{BoxFuture, RuntimeConfig};
use scripthost_host::{ActionRegistry, ActionTable, FsStore, HostServices, NoticeLog, ScriptPicker};
use scripthost_runtime::{EvaluatorSet, ScriptRuntime};

#[derive(Parser)]
#[command(
    name = "scripthost",
    version,
    about = "Run vault scripts as invocable actions",
    long_about = "scripthost turns the scripts in a folder of your vault into actions.\n\n\
                  Scripts are Rhai or Lua files, or markdown notes whose front matter \
                  marks them invocable."
)]
struct Cli {
    /// Vault root (overrides the config file)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Scripts folder, relative to the vault root
    #[arg(short, long, global = true)]
    scripts_folder: Option<String>,

    /// Startup script, relative to the vault root
    #[arg(long, global = true)]
    startup_script: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List invocable scripts in the scripts folder
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Register scripts and list the resulting actions
    Actions {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Execute an action by id
    Exec {
        /// Action id, e.g. invoke-script-file-hello.rhai
        id: String,
    },

    /// Invoke the startup script and keep scripts registered until Ctrl-C
    Run,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct ActionRow {
    id: String,
    name: String,
    icon: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::List { format } => run_list(config, format).await,
        Command::Actions { format } => run_actions(config, format).await,
        Command::Exec { id } => run_exec(config, &id).await,
        Command::Run => run_watch(config).await,
    }
}

/// Read the config file and apply command line overrides.
fn load_config(cli: &Cli) -> Result<RuntimeConfig> {
    let path = cli.config.clone().unwrap_or_else(RuntimeConfig::default_path);
    let mut config = RuntimeConfig::load_or_default(&path)
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(folder) = &cli.scripts_folder {
        config.scripts_folder = Some(folder.clone());
    }
    if let Some(script) = &cli.startup_script {
        config.startup_script = Some(script.clone());
    }

    config.root = config.root.canonicalize().context("Invalid vault root")?;
    Ok(config)
}

fn build_runtime(config: RuntimeConfig) -> (Arc<ScriptRuntime>, Arc<ActionTable>) {
    let actions = Arc::new(ActionTable::new());
    let services = HostServices::new(
        Arc::new(FsStore::new(&config.root)),
        actions.clone(),
        Arc::new(NoticeLog::new()),
    )
    .with_picker(Arc::new(StdinPicker));

    let runtime = ScriptRuntime::new(services, config, EvaluatorSet::builtin());
    (runtime, actions)
}

/// List invocable scripts without evaluating them.
async fn run_list(config: RuntimeConfig, format: OutputFormat) -> Result<()> {
    let folder = config
        .scripts_folder()
        .map(str::to_string)
        .ok_or_else(|| eyre!("No scripts folder configured"))?;
    let (runtime, _) = build_runtime(config);

    let scripts = runtime
        .bridge()
        .discover(&folder)
        .await
        .with_context(|| format!("Failed to list {folder}"))?;

    match format {
        OutputFormat::Text => {
            if scripts.is_empty() {
                println!("No invocable scripts found in {folder}");
            }
            for script in &scripts {
                println!("{script}");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&scripts)?);
        }
    }
    Ok(())
}

/// Register everything and print the action table.
async fn run_actions(config: RuntimeConfig, format: OutputFormat) -> Result<()> {
    let (runtime, actions) = build_runtime(config.clone());
    runtime.on_load();
    runtime.apply_settings(config).await;

    let rows: Vec<ActionRow> = actions
        .actions()
        .into_iter()
        .map(|action| ActionRow {
            id: action.id,
            name: action.name,
            icon: action.icon,
        })
        .collect();

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(" {} action(s)", rows.len());
            println!("{}", "─".repeat(70));
            for row in &rows {
                println!(" {:<40} {}", row.id, row.name);
            }
            println!();
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    runtime.shutdown().await;
    Ok(())
}

/// Bring the runtime up, execute one action, tear down.
async fn run_exec(config: RuntimeConfig, id: &str) -> Result<()> {
    let (runtime, actions) = build_runtime(config.clone());
    runtime.on_load();
    runtime.apply_settings(config).await;

    let Some(action) = actions.find_action(id) else {
        runtime.shutdown().await;
        bail!("No action with id {id}");
    };

    let result = action.execute().await;
    runtime.drain_requests().await;
    runtime.shutdown().await;

    if !result.with_context(|| format!("Action {id} failed"))? {
        eprintln!("Action {id} is not available");
    }
    Ok(())
}

/// Long-running host: startup script, registration and folder watch.
async fn run_watch(config: RuntimeConfig) -> Result<()> {
    let (runtime, actions) = build_runtime(config);
    runtime.on_load();
    runtime.on_layout_ready().await?;

    eprintln!("{} action(s) registered. Press Ctrl-C to stop.", actions.len());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    runtime.shutdown().await;
    Ok(())
}

/// Picker reading a numbered choice from standard input.
struct StdinPicker;

impl ScriptPicker for StdinPicker {
    fn pick<'a>(&'a self, items: &'a [String], placeholder: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            {
                let mut stderr = std::io::stderr().lock();
                for (i, item) in items.iter().enumerate() {
                    let _ = writeln!(stderr, "{:>3}. {item}", i + 1);
                }
                let _ = write!(stderr, "{placeholder}: ");
                let _ = stderr.flush();
            }

            let mut line = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .ok()?;

            let choice = line.trim();
            match choice.parse::<usize>() {
                Ok(n) if (1..=items.len()).contains(&n) => Some(items[n - 1].clone()),
                _ => items.iter().find(|item| item.as_str() == choice).cloned(),
            }
        })
    }
}
