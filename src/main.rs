use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use taskd::{config::TaskdConfig, rest, storage::Storage, AppContext};
use tracing::info;

#[derive(Parser)]
#[command(name = "taskd", about = "taskd — task-tracking REST API daemon", version)]
struct Args {
    /// HTTP server port
    #[arg(long, env = "TASKD_PORT")]
    port: Option<u16>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "TASKD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TASKD_LOG")]
    log: Option<String>,

    /// Bind address for the HTTP server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "TASKD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TASKD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(TaskdConfig::new(
        args.port,
        args.data_dir,
        args.log,
        args.bind_address,
    ));

    // Init once — must happen before any tracing calls.
    let _file_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    info!("data dir: {}", config.data_dir.display());
    let storage = Arc::new(Storage::new(&config.data_dir).await?);
    let ctx = Arc::new(AppContext::new(config, storage));

    rest::start_rest_server(ctx).await
}

/// Initialize the tracing subscriber.
/// `log_format` selects the stdout format: `"pretty"` (default, compact
/// human-readable) or `"json"` (structured, for log aggregators).
///
/// If `log_file` is set, logs additionally go to a daily-rolling plain-text
/// file; the returned `WorkerGuard` must stay alive for the process lifetime.
/// An uncreatable log directory falls back to stdout-only — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    // Resolve the file writer first; any failure degrades to stdout-only.
    let file_writer = log_file.and_then(|path| {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("taskd.log"));
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            return None;
        }
        let appender = tracing_appender::rolling::daily(dir, filename);
        Some(tracing_appender::non_blocking(appender))
    });

    match file_writer {
        Some((non_blocking, guard)) => {
            if use_json {
                tracing_subscriber::registry()
                    .with(EnvFilter::new(log_level))
                    .with(fmt::layer().json())
                    .with(fmt::layer().with_writer(non_blocking))
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(EnvFilter::new(log_level))
                    .with(fmt::layer().compact())
                    .with(fmt::layer().with_writer(non_blocking))
                    .init();
            }
            Some(guard)
        }
        None if use_json => {
            tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            None
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            None
        }
    }
}
