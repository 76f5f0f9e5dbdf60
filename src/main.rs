//! platio - platform telemetry and control tool
//!
//! A command-line tool for reading hardware signals and writing hardware
//! controls.

use clap::Parser;
use platio::cli::args::{generate_completions, Cli, Commands};
use platio::commands::{run_read, run_write};
use platio::config::{Config, ConfigBuilder, GeneralConfig};
use platio::error::{AppError, ErrorCode, PioError};

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        generate_completions(*shell);
        return;
    }

    // Logging is set up once the config file and CLI flags are merged
    let result = load_config(&cli).and_then(|config| {
        init_logging(&config.general);
        run(&cli, &config)
    });

    if let Err(e) = result {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn init_logging(general: &GeneralConfig) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(general.default_log_filter()))
        .format_timestamp(None)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, AppError> {
    Ok(ConfigBuilder::new()
        .with_file(cli.config.as_deref())?
        .with_verbose(cli.verbose.then_some(true))
        .with_backend(cli.backend)
        .with_library(cli.library.clone())
        .with_topology_cache(cli.topology_cache.clone())
        .build()?)
}

fn run(cli: &Cli, config: &Config) -> Result<(), AppError> {
    match &cli.command {
        Commands::Read(args) => run_read(args, config, cli.format),

        Commands::Write(args) => run_write(args, config, cli.format),

        Commands::Completions { .. } => Ok(()),
    }
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Pio(PioError::Backend(e)) if e.code == ErrorCode::PlatformUnsupported => {
            eprintln!();
            eprintln!("Hint: Make sure the platform library is installed.");
            eprintln!("      Use --library to name it, or --backend nvml for NVIDIA GPUs.");
        }
        AppError::Pio(PioError::Backend(e)) if e.code == ErrorCode::Os(13) => {
            eprintln!();
            eprintln!("Hint: Try running with sudo or as root.");
        }
        _ => {}
    }
}
