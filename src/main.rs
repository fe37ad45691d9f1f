use anyhow::Context;
use binlog_relay::capture::{json_lines, run_source};
use binlog_relay::kafka::{consumer, KafkaProducer, TopicManager};
use binlog_relay::{BatchingRelay, Config, LoggingHandler, DEFAULT_LOG_FILTER};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "binlog-relay")]
#[command(about = "Relays MySQL binlog change events to Kafka", long_about = None)]
struct Args {
    #[arg(short, long, global = true, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, global = true, help = "Verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forward row events to Kafka in timed batches
    Relay {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,

        /// Newline-delimited JSON change events; stdin when omitted
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Log change events without forwarding them
    Log {
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Log every message already on the relay topic
    Tail {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,

        #[arg(short, long, default_value = "binlog-relay-tail")]
        group: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting binlog-relay");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    match args.command {
        Command::Relay { config, input } => run_relay(&config, input, cancel).await,
        Command::Log { input } => {
            let events = Box::pin(json_lines(open_input(input).await?));
            let handled = run_source(events, &LoggingHandler::new(), &cancel).await?;
            info!(handled, "Done");
            Ok(())
        }
        Command::Tail { config, group } => {
            let config = load_config(&config)?;
            let read = consumer::tail(&config.kafka, &group, cancel).await?;
            info!(read, "Done");
            Ok(())
        }
    }
}

async fn run_relay(
    config_path: &Path,
    input: Option<PathBuf>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if config.kafka.create_topic {
        TopicManager::new(&config.kafka)?
            .ensure_topic_exists(&config.kafka.topic)
            .await?;
    }

    let producer = Arc::new(KafkaProducer::new(&config.kafka)?);
    let relay = Arc::new(BatchingRelay::new(producer, &config.relay)?);

    if let Some(checkpoints) = relay.checkpoints() {
        match checkpoints.load().await? {
            Some(checkpoint) => info!(
                position = %checkpoint.position,
                message_count = checkpoint.message_count,
                "Capture engine should resume from checkpoint"
            ),
            None => info!("No checkpoint found, starting from the current position"),
        }
    }

    let flush_task = relay.start_auto_flush(config.relay.flush_interval(), cancel.clone())?;

    let events = Box::pin(json_lines(open_input(input).await?));
    let outcome = run_source(events, &*relay, &cancel).await;

    relay.close();
    cancel.cancel();
    if let Err(e) = flush_task.await {
        warn!(error = %e, "Auto flush task ended abnormally");
    }

    let last = relay.flush(config.relay.send_timeout()).await;
    if let Some(e) = &last.error {
        error!(batch_size = last.sent.len(), error = %e, "Final flush failed");
    }

    let stats = relay.stats();
    info!(
        flushes = stats.flushes,
        messages_sent = stats.messages_sent,
        batches_failed = stats.batches_failed,
        messages_dropped = stats.messages_dropped,
        "Relay stopped"
    );

    let handled = outcome?;
    info!(handled, "Done");
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    info!("Loading configuration from {:?}", path);

    let config = Config::from_file(path)
        .with_context(|| format!("failed to load configuration from {:?}", path))?;

    info!(
        kafka_brokers = ?config.kafka.brokers,
        kafka_topic = %config.kafka.topic,
        flush_interval_ms = config.relay.flush_interval_ms,
        send_timeout_ms = config.relay.send_timeout_ms,
        on_send_failure = ?config.relay.on_send_failure,
        "Configuration summary"
    );

    Ok(config)
}

async fn open_input(input: Option<PathBuf>) -> anyhow::Result<Box<dyn AsyncRead + Unpin + Send>> {
    match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdin())),
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received stop signal"),
        () = terminate => info!("Received terminate signal"),
    }

    cancel.cancel();
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("binlog_relay=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
