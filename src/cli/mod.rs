//! Command-line interface for Keruu.
//!
//! Runs one consumer fed from standard input (one message per line) and
//! prints gathered metrics. Just run `keruu` to start with sensible defaults!

use crate::accumulator::ChannelAccumulator;
use crate::consumer::Consumer;
use crate::core::config::ConfigBuilder;
use crate::core::{Config, KeruuError, Metric, Result};
use crate::parser;
use crate::receiver::ReceiverState;
use crate::transport::ReaderTransport;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Buffered metric consumer - pipe values in, get metrics out
#[derive(Parser, Debug)]
#[command(name = "keruu")]
#[command(version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/keruu/config.yaml)
    #[arg(short, long, env = "KERUU_CONFIG")]
    pub config: Option<PathBuf>,

    /// Capacity of the message queue and metric buffer
    #[arg(long, env = "KERUU_BUFFER_SIZE")]
    pub buffer_size: Option<usize>,

    /// Tag key receiving the originating topic ("" disables tagging)
    #[arg(long, env = "KERUU_TOPIC_TAG")]
    pub topic_tag: Option<String>,

    /// Topic that input lines are published under (repeatable)
    #[arg(long = "topic", env = "KERUU_TOPICS", value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Gather interval, e.g. "10s" or "500ms"
    #[arg(long, env = "KERUU_INTERVAL", value_parser = parse_interval)]
    pub interval: Option<Duration>,

    /// Enable debug logging
    #[arg(short, long, env = "KERUU_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Show version information
    #[arg(short = 'V', long = "show-version")]
    pub version: bool,
}

fn parse_interval(raw: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment variables
    /// 2. Config file
    /// 3. Defaults
    pub async fn load_config(&self) -> Result<Config> {
        let builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => match dirs::config_dir().map(|d| d.join("keruu").join("config.yaml")) {
                Some(path) if path.exists() => path,
                _ => return self.apply_overrides(builder),
            },
        };

        let builder = match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                let builder = builder.from_yaml(&content)?;
                tracing::debug!(path = ?config_path, "loaded configuration file");
                builder
            },
            Err(e) if self.config.is_some() => {
                return Err(KeruuError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => builder,
        };

        self.apply_overrides(builder)
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(size) = self.buffer_size {
            builder = builder.buffer_size(size);
        }
        if let Some(key) = &self.topic_tag {
            builder = builder.topic_tag(key.as_str());
        }
        if !self.topics.is_empty() {
            builder = builder.topics(self.topics.clone());
        }
        if let Some(interval) = self.interval {
            builder = builder.interval(interval);
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging based on configuration.
    ///
    /// `--debug` wins over `KERUU_LOG_LEVEL`, which wins over the config file.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let level = if self.debug {
            "debug".to_string()
        } else {
            std::env::var("KERUU_LOG_LEVEL").unwrap_or_else(|_| config.logging.level.as_str().to_string())
        };
        let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

        // Logs go to stderr; stdout carries metrics
        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(false)
                .compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| KeruuError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the Keruu application.
pub async fn execute(cli: Cli) -> Result<()> {
    if cli.version {
        println!("keruu {}", env!("CARGO_PKG_VERSION"));
        println!("Buffered, backpressure-aware metric consumer");
        return Ok(());
    }

    let config = cli.load_config().await?;
    cli.init_logging(&config)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Buffer size: {}", config.consumer.buffer_size);
        println!("  Topic tag: {:?}", config.consumer.topic_tag);
        println!("  Topics: {}", config.consumer.topics.join(", "));
        println!("  Topic parsing rules: {}", config.consumer.topic_parsing.len());
        println!("  Gather interval: {:?}", config.gather.interval);
        return Ok(());
    }

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let parser = parser::from_config(&config.parser)?;
    let transport = ReaderTransport::stdin();
    let mut consumer = Consumer::new(config.consumer.clone(), parser, Box::new(transport))?;
    consumer.start()?;

    let (tx, rx) = crossbeam_channel::unbounded::<Metric>();
    let mut acc = ChannelAccumulator::new(tx).with_global_tags(&config.gather.global_tags);
    let printer = tokio::task::spawn_blocking(move || {
        for metric in rx {
            println!("{}", metric);
        }
    });

    let mut ticker = tokio::time::interval(config.gather.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    tracing::info!(interval = ?config.gather.interval, "Keruu running, reading metrics from stdin");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                consumer.gather(&mut acc)?;
                if consumer.state() == ReceiverState::Stopped {
                    tracing::info!("Input closed, stopping...");
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Received shutdown signal, stopping...");
                break;
            }
        }
    }

    consumer.stop()?;
    consumer.gather(&mut acc)?;
    let stats = consumer.stats();
    drop(acc);
    printer.await?;

    tracing::info!(
        received = stats.messages_received,
        queue_dropped = stats.messages_dropped,
        parse_errors = stats.parse_errors,
        buffer_dropped = stats.metrics_dropped,
        gathered = stats.metrics_gathered,
        "consumer summary"
    );
    Ok(())
}
