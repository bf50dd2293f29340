use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ics_cli::commands::import;
use ics_cli::{Cli, Config};

/// Exit status for usage errors.
const USAGE_EXIT_CODE: i32 = 1;

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version are not errors
            let code = if err.use_stderr() { USAGE_EXIT_CODE } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_cli_overrides(&cli);
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = std::io::stdout().lock();
    import::run(&mut stdout, &cli, &config)?;
    Ok(())
}
