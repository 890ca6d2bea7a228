//! Heat-pump bridge - command line entry point
//!
//! Thin operator shell over [`PortalClient`]: log in, read values, write a
//! setting, or poll readings as JSON lines until Ctrl-C.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use heatpump_bridge::{
    config::LoggingConfig,
    logging::{init_logging, LogConfig},
    BridgeConfig, HeatPumpPortal, PortalClient,
};
use std::{path::PathBuf, time::Duration};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

/// Heat-pump portal bridge
#[derive(Parser, Debug)]
#[command(name = "heatpump-bridge")]
#[command(about = "Read and write heat-pump settings through the vendor web portal")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "HEATPUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and print the token expiry
    Login,
    /// Fetch all readings once and print them as JSON
    Read,
    /// Write a raw value to a settings field
    Write {
        /// Settings form field name
        field: String,
        /// Already formatted value
        value: String,
    },
    /// Write a temperature in °C to a settings field
    WriteTemperature {
        /// Settings form field name
        field: String,
        /// Temperature in °C
        #[arg(allow_negative_numbers = true)]
        celsius: f64,
    },
    /// Write an option index to a select field
    WriteSelection {
        /// Settings form field name
        field: String,
        /// Option index
        option: i64,
    },
    /// Print readings as JSON lines until interrupted
    Poll {
        /// Interval between reads (e.g. "60s", "5m"); defaults to the configured one
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        interval: Option<Duration>,
    },
}

impl Cli {
    /// Initialize logging based on configuration
    fn initialize_logging(&self, settings: &LoggingConfig) -> anyhow::Result<()> {
        let mut log_config = LogConfig::from_settings(settings);
        if self.debug {
            log_config.level = Level::DEBUG;
        }
        init_logging(log_config).map_err(|e| anyhow!(e))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        BridgeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    cli.initialize_logging(&config.logging)
        .context("Failed to initialize logging")?;

    if !config.credentials.has_password() {
        config.credentials.password = rpassword::prompt_password(format!(
            "Portal password for {}: ",
            config.credentials.username
        ))
        .context("Failed to read password")?;
    }

    config.validate()?;
    let client = PortalClient::from_config(&config)?;

    match cli.command {
        Command::Login => {
            let session = client.authenticate().await?;
            match session.expires_at {
                Some(expires_at) => println!("Logged in; token valid until {expires_at}"),
                None => println!("Logged in"),
            }
        }
        Command::Read => {
            let readings = client.fetch_readings().await?;
            println!("{}", serde_json::to_string_pretty(&readings)?);
        }
        Command::Write { field, value } => {
            client.write_setting(&field, &value).await?;
            println!("{field} = {value}");
        }
        Command::WriteTemperature { field, celsius } => {
            client.write_temperature(&field, celsius).await?;
            println!("{field} = {celsius:.1}");
        }
        Command::WriteSelection { field, option } => {
            client.write_selection(&field, option).await?;
            println!("{field} = {option}");
        }
        Command::Poll { interval } => {
            let interval = interval.unwrap_or(config.poll_interval);
            let shutdown = CancellationToken::new();

            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    signal.cancel();
                }
            });

            info!("Polling every {}", humantime_serde::re::humantime::format_duration(interval));
            poll(&client, interval, shutdown).await;
        }
    }

    Ok(())
}

/// Read on every tick and print one JSON line per cycle. Failed cycles are
/// logged and the loop carries on.
async fn poll(portal: &dyn HeatPumpPortal, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = portal.fetch_readings() => result,
        };

        match result {
            Ok(readings) => match serde_json::to_string(&readings) {
                Ok(line) => println!("{line}"),
                Err(e) => error!("Failed to serialize readings: {}", e),
            },
            Err(e) => error!(
                code = e.to_error_code().as_number(),
                "Poll cycle failed: {}", e
            ),
        }
    }

    info!("Poll loop stopped");
}
