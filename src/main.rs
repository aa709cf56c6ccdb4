use std::env;
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use file_logger::{log_line, FileLogger, FileLoggerConfig, Severity};
use tracing_subscriber::EnvFilter;

const THREADS: usize = 4;
const MESSAGES_PER_THREAD: usize = 10_000;

/// Writes a burst of lines from several threads.
///
/// Usage: `file_logger [base-path] [loglevel]`. The logger's own events are
/// printed to stderr, filtered by `RUST_LOG`.
fn main() -> Result<(), Box<dyn Error>> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .init();

    let mut args = env::args().skip(1);
    let filename = args.next().unwrap_or_else(|| "memcached".to_string());
    let config = FileLoggerConfig::default()
        .with_filename(filename)
        .with_pretty_print(true)
        .with_buffer_size(64 * 1024)
        .with_cycle_size(1024 * 1024)
        .with_persistence_level(Severity::Info)
        .with_log_level(args.next().as_deref().unwrap_or("warning"))?;

    let logger = Arc::new(FileLogger::start(config)?);
    let start = Instant::now();

    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..MESSAGES_PER_THREAD {
                    // Every hundredth message repeats so the rollup shows up
                    let result = if i % 100 < 3 {
                        log_line!(logger, Severity::Info, "worker {} heartbeat", worker)
                    } else {
                        log_line!(logger, Severity::Info, "worker {} handled request {}", worker, i)
                    };
                    if result.is_err() {
                        break;
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        let _ = worker.join();
    }
    log_line!(logger, Severity::Warning, "burst finished")?;
    logger.shutdown();

    let elapsed = start.elapsed();
    let total = THREADS * MESSAGES_PER_THREAD;
    println!(
        "Logged {} messages in {:?} ({:.2} million msgs/sec)",
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64() / 1_000_000.0
    );
    Ok(())
}
