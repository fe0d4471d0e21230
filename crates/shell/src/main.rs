//! ProcBridge - terminal front-end
//! Runs a CLI script, streams its output and forwards typed input

mod interactive;
mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use procbridge_core::application::{ProcessBridge, SessionController, SessionHandle};
use procbridge_core::domain::{BridgeConfig, Invocation};
use procbridge_core::port::id_provider::UuidProvider;
use procbridge_core::port::time_provider::SystemTimeProvider;
use procbridge_core::port::ConfigStore;
use procbridge_infra_config::{JsonConfigStore, CONFIG_PATH_ENV};
use procbridge_infra_system::discovery::{default_candidates, TOOL_PATH_ENV};
use procbridge_infra_system::{locate_tool_dir, EnvPolicy, SubprocessLauncher};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_TOOL_NAME: &str = "sysmo-usim-tool";

#[derive(Parser)]
#[command(name = "procbridge")]
#[command(about = "Run a CLI script and bridge its input and output", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file location
    #[arg(long, global = true, env = CONFIG_PATH_ENV)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script and attach to it
    Run {
        /// Script or executable to run
        target: PathBuf,

        /// Arguments passed through unmodified
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Run the script through an interpreter (e.g. python3)
        #[arg(short, long)]
        interpreter: Option<String>,

        /// Working directory for the child
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Stop the child after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Run to completion without forwarding input, then print all output
        #[arg(long)]
        capture: bool,
    },

    /// Repeat the last run
    Rerun {
        #[arg(long)]
        capture: bool,
    },

    /// Show or edit the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Find the tool directory
    Locate {
        /// Tool name used for the default install locations
        #[arg(default_value = DEFAULT_TOOL_NAME)]
        tool: String,

        /// Store the directory found as the configured tool directory
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration as JSON
    Show,
    /// Directory relative targets are resolved against
    SetToolDir { dir: String },
    /// Interpreter for scripts; omit to run targets directly
    SetInterpreter { interpreter: Option<String> },
    /// Reset to defaults
    Clear,
}

fn open_store(path: Option<String>) -> Result<JsonConfigStore> {
    match path {
        Some(path) => Ok(JsonConfigStore::new(shellexpand::tilde(&path).into_owned())),
        None => JsonConfigStore::open_default().context("Failed to locate config file"),
    }
}

fn build_controller(store: Arc<JsonConfigStore>, config: &BridgeConfig) -> SessionController {
    let time_provider = Arc::new(SystemTimeProvider);
    let env_policy = match &config.env_allowlist {
        Some(allowed) => EnvPolicy::Allowlist(allowed.clone()),
        None => EnvPolicy::Inherit,
    };
    let launcher = Arc::new(SubprocessLauncher::new(time_provider.clone()).with_env_policy(env_policy));

    let bridge = ProcessBridge::new(launcher, Arc::new(UuidProvider), time_provider);
    SessionController::new(Arc::new(bridge), store)
}

fn configured_tool_dir(config: &BridgeConfig) -> Option<PathBuf> {
    config
        .tool_dir
        .clone()
        .or_else(|| locate_tool_dir(TOOL_PATH_ENV, &[]))
}

/// Invocation for `run`: flags win over stored defaults
///
/// A target that does not exist relative to the current directory is looked
/// up in the tool directory.
fn build_invocation(
    config: &BridgeConfig,
    target: PathBuf,
    args: Vec<String>,
    interpreter: Option<String>,
    cwd: Option<PathBuf>,
    timeout: Option<u64>,
) -> Invocation {
    let mut invocation = Invocation::new(&target).args(args);

    if let Some(interpreter) = interpreter.or_else(|| config.interpreter.clone()) {
        invocation = invocation.interpreter(interpreter);
    }
    if let Some(secs) = timeout.or(config.timeout_secs) {
        invocation = invocation.timeout(Duration::from_secs(secs));
    }
    if let Some(cwd) = cwd {
        invocation = invocation.working_dir(cwd);
    } else if !target.exists() {
        if let Some(dir) = configured_tool_dir(config) {
            invocation = invocation.in_tool_dir(&dir);
        }
    }
    invocation
}

async fn run_session(
    controller: &mut SessionController,
    store: &JsonConfigStore,
    invocation: Invocation,
    capture: bool,
) -> Result<i32> {
    if !capture {
        let session = controller.run(invocation).await?;
        return attach(controller, &session).await;
    }

    let captured = controller.bridge().run_captured(invocation.clone()).await?;
    interactive::print_captured(&captured)?;
    if let Err(e) = store.update(&mut |config: &mut BridgeConfig| config.remember(&invocation)) {
        warn!(error = %e, "Failed to persist last-used target");
    }

    interactive::print_status(&captured.report);
    Ok(interactive::exit_code(&captured.report))
}

async fn attach(controller: &SessionController, session: &SessionHandle) -> Result<i32> {
    let report = interactive::drive(controller, session).await?;
    interactive::print_status(&report);
    Ok(interactive::exit_code(&report))
}

fn config_command(store: &JsonConfigStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = store.load()?;
            println!("{}", format!("# {}", store.path().display()).cyan());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::SetToolDir { dir } => {
            let dir = PathBuf::from(shellexpand::tilde(&dir).into_owned());
            if !dir.is_dir() {
                bail!("{} is not a directory", dir.display());
            }
            store.update(&mut |config: &mut BridgeConfig| config.tool_dir = Some(dir.clone()))?;
            println!("{}", format!("✓ Tool directory set to {}", dir.display()).green().bold());
        }
        ConfigAction::SetInterpreter { interpreter } => {
            store.update(&mut |config: &mut BridgeConfig| {
                config.interpreter = interpreter.clone()
            })?;
            match interpreter {
                Some(name) => println!("{}", format!("✓ Interpreter set to {}", name).green().bold()),
                None => println!("{}", "✓ Targets run directly".green().bold()),
            }
        }
        ConfigAction::Clear => {
            store.save(&BridgeConfig::default())?;
            println!("{}", "✓ Configuration cleared".green().bold());
        }
    }
    Ok(())
}

fn locate_command(store: &JsonConfigStore, tool: &str, save: bool) -> Result<i32> {
    let Some(dir) = locate_tool_dir(TOOL_PATH_ENV, &default_candidates(tool)) else {
        eprintln!(
            "{}",
            format!("{} not found; set {} or install it under ~/{}", tool, TOOL_PATH_ENV, tool)
                .yellow()
        );
        return Ok(1);
    };

    println!("{}", dir.display());
    if save {
        store.update(&mut |config: &mut BridgeConfig| config.tool_dir = Some(dir.clone()))?;
        println!("{}", "✓ Saved as tool directory".green().bold());
    }
    Ok(0)
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let store = Arc::new(open_store(cli.config)?);

    match cli.command {
        Commands::Run {
            target,
            args,
            interpreter,
            cwd,
            timeout,
            capture,
        } => {
            let config = store.load()?;
            let invocation = build_invocation(&config, target, args, interpreter, cwd, timeout);
            let mut controller = build_controller(store.clone(), &config);
            run_session(&mut controller, &store, invocation, capture).await
        }

        Commands::Rerun { capture } => {
            let config = store.load()?;
            let mut controller = build_controller(store.clone(), &config);
            if capture {
                let Some(invocation) = config.last_invocation() else {
                    bail!("Nothing to repeat yet; use `procbridge run` first");
                };
                return run_session(&mut controller, &store, invocation, true).await;
            }
            let session = controller.rerun_last().await?;
            attach(&controller, &session).await
        }

        Commands::Config { action } => {
            config_command(&store, action)?;
            Ok(0)
        }

        Commands::Locate { tool, save } => locate_command(&store, &tool, save),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let guard = logging::init_logging()?;

    info!("ProcBridge v{} starting", VERSION);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            1
        }
    };

    // The stdin reader may still be blocked on the terminal; exit without
    // waiting for the runtime to shut it down.
    drop(guard);
    std::process::exit(code);
}
