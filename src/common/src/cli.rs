use clap::Parser;
use std::path::PathBuf;

/// Global arguments accepted by every `legalhold` command
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

impl CommonArgs {
    /// Default filter directive implied by `-v` / `-q`.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Install the global tracing subscriber. `RUST_LOG` wins over the flags.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(args.log_level()));

        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load and validate configuration, honouring an explicit `--config` path
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        let config = match config_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Configuration::load_from_path(path).context("Failed to load configuration")?
            }
            None => Configuration::load().context("Failed to load configuration")?,
        };

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("Legal Hold Export Configuration:");
            println!("================================");
            println!("Record store DSN: {}", config.database.dsn);
            println!("Registry DSN: {}", config.registry.dsn);
            println!("Storage DSN: {}", config.storage.dsn);
            println!("Job enabled: {}", config.job.enabled);
            match &config.job.time_of_day {
                Some(time) => println!("Job runs daily at: {time} UTC"),
                None => println!("Job interval: {:?}", config.job.interval),
            }
            println!("Job stop timeout: {:?}", config.job.stop_timeout);
            println!("Export batch size: {}", config.export.batch_size);
            println!("Export slice pause: {:?}", config.export.slice_pause);
        }
        Ok(())
    }

    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}
