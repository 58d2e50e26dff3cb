use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sandbox_runner::backoff::Backoff;
use sandbox_runner::config::Config;
use sandbox_runner::sandbox::{HttpSandboxProvider, KeyPool, SandboxSession};
use sandbox_runner::{BatchResult, CodeBlock, CodeExecutor, ExecutorError};

/// Maximum consecutive provisioning failures before giving up.
const MAX_PROVISION_ATTEMPTS: u32 = 5;

/// Shell convention for termination by SIGINT (128 + 2).
const INTERRUPTED_EXIT_CODE: i32 = 130;

fn print_help() {
    println!(
        "\
sandbox-runner v{}

Runs a batch of code blocks inside a remote sandbox and copies the
files it produces to a local directory.

USAGE:
    sandbox-runner [OPTIONS] [CONFIG_PATH] BLOCKS_JSON

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/runner.toml]
    BLOCKS_JSON    JSON array of {{\"language\", \"code\"}} objects, or - for stdin

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

EXIT STATUS:
    The exit code of the batch (1 if it stopped on an unsupported
    language), or 130 if interrupted by Ctrl-C.

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG           Log level filter for tracing
                       (e.g. debug, sandbox_runner=debug,warn)
    SANDBOX_API_KEY    Typical name for the provider key in api_keys

EXAMPLES:
    sandbox-runner blocks.json                        # uses config/runner.toml
    sandbox-runner /etc/runner.toml blocks.json       # custom config path
    RUST_LOG=debug sandbox-runner - < blocks.json     # live output in the logs",
        env!("CARGO_PKG_VERSION"),
    );
}

/// Splits positional arguments into (config path, blocks path).
fn parse_args(args: &[String]) -> Result<(String, String)> {
    match args {
        [blocks] => Ok(("config/runner.toml".to_string(), blocks.clone())),
        [config, blocks] => Ok((config.clone(), blocks.clone())),
        _ => Err(anyhow!("Expected [CONFIG_PATH] BLOCKS_JSON (see --help)")),
    }
}

fn read_blocks(path: &str) -> Result<Vec<CodeBlock>> {
    let content = if path == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?
    };
    serde_json::from_str(&content).with_context(|| format!("Invalid code blocks in {path}"))
}

/// Process exit code for a finished batch, or for one abandoned on Ctrl-C.
fn exit_code(result: Option<&BatchResult>) -> i32 {
    result.map_or(INTERRUPTED_EXIT_CODE, |r| r.exit_code)
}

/// Provisions a sandbox, retrying with backoff on failure.
/// Returns `None` if interrupted by Ctrl-C.
async fn provision(config: &Config) -> Result<Option<SandboxSession>> {
    let provider = Arc::new(HttpSandboxProvider::new(&config.sandbox.api_url)?);
    let credentials = Arc::new(KeyPool::new(config.sandbox.api_keys.clone()));
    info!(
        "Sandbox provider: {} ({} key(s))",
        config.sandbox.api_url,
        credentials.len()
    );

    let mut backoff =
        Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 2).with_jitter(0.25);

    loop {
        match SandboxSession::create(
            provider.clone(),
            credentials.clone(),
            config.sandbox.spec(),
        )
        .await
        {
            Ok(session) => return Ok(Some(session)),
            Err(e) => {
                warn!("Provisioning failed: {e}");
                if backoff.exceeded_max_attempts(MAX_PROVISION_ATTEMPTS) {
                    error!("Exceeded {MAX_PROVISION_ATTEMPTS} provisioning attempts, giving up");
                    return Err(e.into());
                }
            }
        }

        let delay = backoff.next_delay();
        info!(
            "Retrying in {}ms (attempt {})...",
            delay.as_millis(),
            backoff.attempt + 1
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received during backoff, exiting");
                return Ok(None);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("sandbox-runner v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => positional.push(arg),
        }
    }

    // Initialize logging (RUST_LOG=debug for live command output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sandbox_runner=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config_path, blocks_path) = parse_args(&positional)?;

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path)?;
    let blocks = read_blocks(&blocks_path)?;
    info!(
        "Loaded {} code block(s); timeout {}s; output to {}",
        blocks.len(),
        config.executor.timeout_secs,
        config.executor.local_dir.display()
    );

    let Some(session) = provision(&config).await? else {
        std::process::exit(exit_code(None));
    };
    let mut executor = CodeExecutor::new(session, &config.executor);

    let outcome = tokio::select! {
        result = executor.execute_code_blocks(&blocks) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, abandoning batch");
            None
        }
    };
    executor.stop().await;

    match outcome {
        Some(Ok(result)) => {
            print!("{}", result.combined_output);
            for file in &result.files {
                info!("Synced {}", file.display());
            }
            info!("Exit code: {}", result.exit_code);
            std::process::exit(exit_code(Some(&result)));
        }
        Some(Err(e @ ExecutorError::InvalidArgument(_))) => Err(e.into()),
        Some(Err(e)) => {
            error!("Sandbox failure: {e}");
            Err(anyhow!("Sandbox became unusable: {e}"))
        }
        None => std::process::exit(exit_code(None)),
    }
}
