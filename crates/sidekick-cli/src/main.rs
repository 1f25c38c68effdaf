mod logging;
mod repl;
mod ui;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sidekick_core::config::Config;
use sidekick_exec::sandbox::PathSandbox;

use crate::repl::Session;

const HOME_DIR: &str = ".sidekick";
const CONFIG_FILE: &str = "config.toml";

/// Chat with a local LLM that proposes file changes and test commands,
/// applied only after you confirm them.
#[derive(Debug, Parser)]
#[command(name = "sidekick", version, about)]
struct Cli {
    /// Config file [default: ~/.sidekick/config.toml]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// OpenAI-compatible API base URL (overrides AI_AGENT_API_BASE)
    #[arg(long, value_name = "URL")]
    api_base: Option<String>,

    /// Model name (overrides AI_AGENT_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Per-command timeout for test actions, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Also log to stderr at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(api_base) = &self.api_base {
            config.provider.api_base = api_base.clone();
        }
        if let Some(model) = &self.model {
            config.provider.model = model.clone();
        }
        if let Some(timeout) = self.timeout {
            config.runner.timeout_secs = timeout;
        }
    }
}

fn main() {
    let result = run();
    if let Err(err) = &result {
        tracing::error!(error = format!("{err:#}"), "fatal");
    }
    logging::flush();
    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let home = dirs::home_dir()
        .map(|home| home.join(HOME_DIR))
        .unwrap_or_else(|| PathBuf::from(HOME_DIR));

    logging::init(&home, cli.verbose)
        .with_context(|| format!("creating log directory {}", home.display()))?;

    let config_path = cli.config.clone().unwrap_or_else(|| home.join(CONFIG_FILE));
    let mut config = Config::load(&config_path)?;
    config.apply_env(|key| std::env::var(key).ok());
    cli.apply(&mut config);
    tracing::debug!(
        config = %config_path.display(),
        api_base = %config.provider.api_base,
        model = %config.provider.model,
        timeout_secs = config.runner.timeout_secs,
        "resolved config"
    );

    ui::install_interrupt_handler().context("installing interrupt handler")?;

    let sandbox = PathSandbox::from_current_dir().context("resolving working directory")?;
    Session::new(config, sandbox)?.run()
}
