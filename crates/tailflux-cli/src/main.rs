use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tailflux_core::Config;
use tailflux_modules::build_lookup;
use tailflux_output::InfluxWriter;
use tailflux_pipeline::Pipeline;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// tailflux - follow a web server access log into InfluxDB
#[derive(Parser, Debug)]
#[command(name = "tailflux")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Access log to follow (overrides config)
    #[arg(long)]
    path: Option<PathBuf>,

    /// InfluxDB descriptor: endpoint@username@password@database@precision@measurement
    #[arg(long)]
    influx_dsn: Option<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref config_path) => Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?,
        None => Config::default(),
    };

    // Flags win over the config file
    if let Some(ref path) = args.path {
        config.ingestion.file.path = path.clone();
    }
    if let Some(ref dsn) = args.influx_dsn {
        config.output.influx.dsn = dsn.clone();
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let level = if args.verbose {
        Level::DEBUG
    } else {
        parse_level(&config.general.log_level)
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(path = %config.ingestion.file.path.display(), "Starting tailflux");

    let lookup = build_lookup(&config.modules.geo)?;
    let descriptor = config.output.influx.descriptor()?;
    let writer = InfluxWriter::connect(descriptor, config.output.influx.timeout())
        .await
        .context("Failed to connect to InfluxDB")?;

    let cancel = CancellationToken::new();
    let running = Pipeline::new(config, lookup, Arc::new(writer))
        .start(cancel.clone())
        .await?;

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => info!("Shutdown signal received, draining pipeline"),
                    Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
                }
                signal_cancel.cancel();
            }
            _ = signal_cancel.cancelled() => {}
        }
    });

    match running.join().await {
        Ok(summary) => {
            info!(
                lines_read = summary.lines_read,
                records = summary.extractor.records,
                unmatched = summary.extractor.unmatched,
                points_written = summary.sink.points_written,
                "tailflux stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "tailflux stopped with an error");
            Err(e.into())
        }
    }
}
