//! kiwi - A Sharded In-Memory Key-Value Server
//!
//! This is the main entry point for the kiwi server.
//! It parses flags into a [`Config`], starts the engine and the expiry
//! sweeper, and runs the accept loop until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use kiwi::config::Config;
use kiwi::storage::{Engine, ExpirySweeper};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kiwi", version, about = "sharded in-memory key-value server speaking RESP")]
struct Args {
    /// Host to bind to
    #[arg(long, env = "KIWI_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "KIWI_PORT", default_value_t = kiwi::DEFAULT_PORT)]
    port: u16,

    /// Number of keyspace shards, each served by its own task
    #[arg(long, env = "KIWI_SHARDS", default_value_t = 16)]
    shards: usize,

    /// Milliseconds between active expiry sweeps
    #[arg(long, env = "KIWI_SWEEP_INTERVAL_MS", default_value_t = 100)]
    sweep_interval_ms: u64,

    /// Outbound bytes at which a connection stops reading requests
    #[arg(long, env = "KIWI_WRITE_HIGH_WATERMARK", default_value_t = 1024 * 1024)]
    write_high_watermark: usize,

    /// Outbound bytes below which a paused connection resumes reading
    #[arg(long, env = "KIWI_WRITE_LOW_WATERMARK", default_value_t = 256 * 1024)]
    write_low_watermark: usize,

    /// Jobs a shard queue holds before senders wait
    #[arg(long, env = "KIWI_SHARD_QUEUE_DEPTH", default_value_t = 256)]
    shard_queue_depth: usize,

    /// Largest bulk string a client may send, in bytes
    #[arg(long, env = "KIWI_PROTO_MAX_BULK_LEN", default_value_t = kiwi::protocol::MAX_BULK_SIZE)]
    proto_max_bulk_len: usize,

    /// Tokio worker threads for connection I/O. Defaults to one per core
    #[arg(long, env = "KIWI_IO_THREADS")]
    io_threads: Option<usize>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "KIWI_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            shards: self.shards,
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            write_high_watermark: self.write_high_watermark,
            write_low_watermark: self.write_low_watermark,
            shard_queue_depth: self.shard_queue_depth,
            max_bulk: self.proto_max_bulk_len,
            io_threads: self.io_threads,
        }
    }
}

fn print_banner(config: &Config) {
    println!(
        r#"
   _    _          _
  | | _(_)_      _(_)
  | |/ / \ \ /\ / / |
  |   <| |\ V  V /| |
  |_|\_\_| \_/\_/ |_|

kiwi v{} - sharded in-memory key-value server
──────────────────────────────────────────────
Listening on {} with {} shards
Use Ctrl+C to shut down.
"#,
        kiwi::VERSION,
        config.bind_address(),
        config.shards,
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = args.into_config();
    config.validate().context("invalid configuration")?;

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(threads) = config.io_threads {
        runtime.worker_threads(threads.max(1));
    }
    let runtime = runtime.build().context("failed to build tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let engine = Engine::start(&config);
    let _sweeper = ExpirySweeper::start(engine.clone(), config.sweep_interval);

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(addr = %config.bind_address(), shards = config.shards, "listening");

    print_banner(&config);

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    kiwi::server::serve(listener, engine, shutdown).await;

    info!("server shutdown complete");
    Ok(())
}
