use file_logger::clock::WallClock;
use file_logger::{
    log_line, CapturedDiagnostics, FileLogger, FileLoggerConfig, FileLoggerError, FixedClock,
    Formatter, LogError, MemorySink, Severity,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const NOW_SECS: i64 = 1_700_000_000;
const NOW_MICROS: u32 = 250_000;

fn clock() -> FixedClock {
    FixedClock::at(NOW_SECS, NOW_MICROS)
}

fn prefix() -> String {
    clock().now().unwrap().render_prefix()
}

fn test_config() -> FileLoggerConfig {
    FileLoggerConfig::default()
        .with_filename("test")
        .with_pretty_print(true)
        .with_unit_test(true)
}

struct Harness {
    logger: FileLogger,
    sink: MemorySink,
    diagnostics: CapturedDiagnostics,
}

fn start(config: FileLoggerConfig) -> Harness {
    let sink = MemorySink::new();
    let diagnostics = CapturedDiagnostics::new();
    let logger = FileLogger::builder(config)
        .sink(sink.clone())
        .clock(clock())
        .diagnostics(diagnostics.clone())
        .start()
        .unwrap();
    Harness {
        logger,
        sink,
        diagnostics,
    }
}

/// Lines of the persisted output with the fixed timestamp prefix removed.
fn bodies(text: &str) -> Vec<String> {
    let prefix = prefix();
    text.lines()
        .map(|line| line.strip_prefix(prefix.as_str()).unwrap_or(line).to_string())
        .collect()
}

#[test]
fn test_distinct_messages_all_persisted() {
    let h = start(test_config().with_buffer_size(1024));
    let formatter = Formatter::new(Arc::new(clock()), true);

    let mut expected_len = 0;
    for i in 0..50 {
        let msg = format!("distinct message number {:04} padded out", i);
        expected_len += formatter
            .render(Severity::Warning, format_args!("{}", msg))
            .unwrap()
            .len();
        log_line!(h.logger, Severity::Warning, "{}", msg).unwrap();
    }
    h.logger.shutdown();

    let text = h.sink.text();
    assert_eq!(text.len(), expected_len);
    let bodies = bodies(&text);
    assert_eq!(bodies.len(), 50);
    for (i, body) in bodies.iter().enumerate() {
        assert_eq!(body, &format!(" WARNING: distinct message number {:04} padded out", i));
    }
    assert!(h.sink.write_calls() > 1, "1024 byte buffers should have been swapped");
}

#[test]
fn test_repeated_message_rollup() {
    let h = start(test_config());
    for _ in 0..5 {
        log_line!(h.logger, Severity::Warning, "connection reset").unwrap();
    }
    log_line!(h.logger, Severity::Warning, "connection established").unwrap();
    h.logger.shutdown();

    assert_eq!(
        bodies(&h.sink.text()),
        vec![
            " WARNING: connection reset",
            "message repeated 4 times",
            " WARNING: connection established",
        ]
    );
}

#[test]
fn test_pending_rollup_flushed_on_shutdown() {
    let h = start(test_config());
    for _ in 0..3 {
        log_line!(h.logger, Severity::Warning, "disk almost full").unwrap();
    }
    h.logger.shutdown();

    assert_eq!(
        bodies(&h.sink.text()),
        vec![" WARNING: disk almost full", "message repeated 2 times"]
    );
}

#[test]
fn test_different_severity_is_not_a_repeat() {
    let h = start(test_config().with_persistence_level(Severity::Info));
    log_line!(h.logger, Severity::Warning, "same text").unwrap();
    log_line!(h.logger, Severity::Info, "same text").unwrap();
    h.logger.shutdown();

    assert_eq!(
        bodies(&h.sink.text()),
        vec![" WARNING: same text", " INFO: same text"]
    );
}

#[test]
fn test_numeric_severity_without_pretty_print() {
    let h = start(test_config().with_pretty_print(false));
    log_line!(h.logger, Severity::Warning, "coded").unwrap();
    h.logger.shutdown();

    assert_eq!(bodies(&h.sink.text()), vec![" 3: coded"]);
}

#[test]
fn test_periodic_flush_in_unit_test_mode() {
    let h = start(test_config());
    log_line!(h.logger, Severity::Warning, "lonely message").unwrap();

    let started = Instant::now();
    while !h.sink.text().contains("lonely message") {
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "message should be flushed on the short test interval"
        );
        thread::sleep(Duration::from_millis(10));
    }
    assert!(started.elapsed() < Duration::from_secs(5));
    h.logger.shutdown();
}

#[test]
fn test_backpressure_blocks_instead_of_dropping() {
    let h = start(
        test_config()
            .with_buffer_size(256)
            .with_unit_test(false)
            .with_sleep_time(Duration::from_secs(1)),
    );
    h.sink.pause();

    let logger = Arc::new(h.logger);
    let done = Arc::new(AtomicBool::new(false));
    let producer = {
        let logger = Arc::clone(&logger);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..20 {
                log_line!(logger, Severity::Warning, "burst line {:02} with some padding text", i).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(300));
    assert!(!done.load(Ordering::SeqCst), "producer should be blocked on a full buffer");

    h.sink.resume();
    producer.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
    logger.shutdown();

    let bodies = bodies(&h.sink.text());
    assert_eq!(bodies.len(), 20);
    for (i, body) in bodies.iter().enumerate() {
        assert_eq!(body, &format!(" WARNING: burst line {:02} with some padding text", i));
    }
    assert!(h
        .diagnostics
        .reports()
        .iter()
        .any(|r| r == "WARNING: waiting for log space to be available"));
}

#[test]
fn test_unit_test_mode_suppresses_space_warning() {
    let h = start(test_config().with_buffer_size(256));
    for i in 0..50 {
        log_line!(h.logger, Severity::Warning, "filler line {:02} with some padding text", i).unwrap();
    }
    h.logger.shutdown();

    assert_eq!(bodies(&h.sink.text()).len(), 50);
    assert!(!h
        .diagnostics
        .reports()
        .iter()
        .any(|r| r.contains("waiting for log space")));
}

#[test]
fn test_concurrent_producers_lose_nothing() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let h = start(test_config().with_buffer_size(1024));
    let logger = Arc::new(h.logger);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    log_line!(logger, Severity::Warning, "thread {} message {}", t, i).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.shutdown();

    let bodies = bodies(&h.sink.text());
    assert_eq!(bodies.len(), THREADS * PER_THREAD);

    // Per-thread order survives interleaving
    let mut next = [0usize; THREADS];
    for body in &bodies {
        let rest = body.strip_prefix(" WARNING: thread ").unwrap();
        let mut parts = rest.split(" message ");
        let t: usize = parts.next().unwrap().parse().unwrap();
        let i: usize = parts.next().unwrap().parse().unwrap();
        assert_eq!(i, next[t], "thread {} out of order", t);
        next[t] += 1;
    }
    assert!(next.iter().all(|&n| n == PER_THREAD));
}

#[test]
fn test_oversized_message_dropped_with_diagnostic() {
    let h = start(test_config());
    let huge = "x".repeat(3000);

    let err = log_line!(h.logger, Severity::Warning, "{}", huge).unwrap_err();
    assert!(matches!(err, LogError::TooLong { .. }));
    log_line!(h.logger, Severity::Warning, "small").unwrap();
    h.logger.shutdown();

    assert_eq!(bodies(&h.sink.text()), vec![" WARNING: small"]);
    assert!(h.diagnostics.reports().iter().any(|r| r.contains("2048 byte limit")));
}

#[test]
fn test_failing_argument_dropped_with_diagnostic() {
    struct Unprintable;
    impl std::fmt::Display for Unprintable {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("half")?;
            Err(std::fmt::Error)
        }
    }

    let h = start(test_config());
    let err = log_line!(h.logger, Severity::Warning, "{} and the rest", Unprintable).unwrap_err();
    assert_eq!(err, LogError::Format);
    h.logger.shutdown();

    assert!(h.sink.text().is_empty());
    assert!(h.diagnostics.reports().iter().any(|r| r.contains("formatting an argument failed")));
}

#[test]
fn test_line_larger_than_buffer_dropped() {
    let h = start(test_config().with_buffer_size(128));
    let long = "y".repeat(200);

    let err = log_line!(h.logger, Severity::Warning, "{}", long).unwrap_err();
    assert!(matches!(err, LogError::ExceedsBuffer { capacity: 128, .. }));
    h.logger.shutdown();

    assert!(h.sink.text().is_empty());
    assert_eq!(h.diagnostics.reports().len(), 1);
}

#[test]
fn test_clock_failure_drops_single_message() {
    let sink = MemorySink::new();
    let diagnostics = CapturedDiagnostics::new();
    let logger = FileLogger::builder(test_config())
        .sink(sink.clone())
        .clock(FixedClock::failing())
        .diagnostics(diagnostics.clone())
        .start()
        .unwrap();

    let err = log_line!(logger, Severity::Warning, "never written").unwrap_err();
    assert!(matches!(err, LogError::Clock(_)));
    logger.shutdown();

    assert!(sink.text().is_empty());
    assert_eq!(diagnostics.reports().len(), 1);
    assert!(diagnostics.echoed().is_empty());
}

#[test]
fn test_shutdown_twice() {
    let h = start(test_config());
    log_line!(h.logger, Severity::Warning, "before shutdown").unwrap();

    h.logger.shutdown();
    let after_first = h.sink.text();
    assert_eq!(bodies(&after_first), vec![" WARNING: before shutdown"]);

    h.logger.shutdown();
    assert_eq!(h.sink.text(), after_first);
    assert!(!h.logger.is_running());
    assert_eq!(h.sink.closed().len(), 1);
}

#[test]
fn test_log_after_shutdown_is_rejected() {
    let h = start(test_config());
    h.logger.shutdown();

    let err = log_line!(h.logger, Severity::Warning, "too late").unwrap_err();
    assert_eq!(err, LogError::ShutDown);
    assert!(h.sink.text().is_empty());
}

#[test]
fn test_no_repeat_counted_while_shutdown_rollup_waits() {
    const BUFFER: usize = 256;
    let h = start(test_config().with_buffer_size(BUFFER));
    let formatter = Formatter::new(Arc::new(clock()), true);
    let rendered_len = |msg: &str| {
        formatter
            .render(Severity::Warning, format_args!("{}", msg))
            .unwrap()
            .len()
    };
    let base = rendered_len("");
    let x_len = rendered_len("x");

    // Over 75% full, so the flusher drains it at once and blocks writing it
    h.sink.pause();
    log_line!(h.logger, Severity::Warning, "{}", "a".repeat(200 - base)).unwrap();
    thread::sleep(Duration::from_millis(300));

    // Leave less room than the rollup line needs
    log_line!(h.logger, Severity::Warning, "{}", "c".repeat(BUFFER - 10 - x_len - base)).unwrap();
    log_line!(h.logger, Severity::Warning, "x").unwrap();
    log_line!(h.logger, Severity::Warning, "x").unwrap();

    let logger = Arc::new(h.logger);
    let shutdown = {
        let logger = Arc::clone(&logger);
        thread::spawn(move || logger.shutdown())
    };
    thread::sleep(Duration::from_millis(100));

    let late = log_line!(logger, Severity::Warning, "x");
    h.sink.resume();
    shutdown.join().unwrap();

    assert_eq!(late, Err(LogError::ShutDown));
    let bodies = bodies(&h.sink.text());
    assert_eq!(
        bodies[bodies.len() - 2..],
        [" WARNING: x".to_string(), "message repeated 1 times".to_string()]
    );
    assert!(h.diagnostics.reports().iter().any(|r| r == "logger is shut down"));
}

#[test]
fn test_concurrent_shutdown_calls() {
    let h = start(test_config());
    log_line!(h.logger, Severity::Warning, "racing shutdown").unwrap();
    let logger = Arc::new(h.logger);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let logger = Arc::clone(&logger);
            let sink = h.sink.clone();
            thread::spawn(move || {
                logger.shutdown();
                // Every caller returns only after the drain is complete
                assert!(sink.text().contains("racing shutdown"));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_drop_flushes_pending_data() {
    let sink = MemorySink::new();
    {
        let logger = FileLogger::builder(test_config())
            .sink(sink.clone())
            .clock(clock())
            .diagnostics(CapturedDiagnostics::new())
            .start()
            .unwrap();
        log_line!(logger, Severity::Warning, "dropped without shutdown").unwrap();
        log_line!(logger, Severity::Warning, "dropped without shutdown").unwrap();
    }
    assert_eq!(
        bodies(&sink.text()),
        vec![" WARNING: dropped without shutdown", "message repeated 1 times"]
    );
}

#[test]
fn test_echo_and_persistence_are_independent() {
    let h = start(
        test_config()
            .with_log_level("debug")
            .unwrap()
            .with_persistence_level(Severity::Warning),
    );

    log_line!(h.logger, Severity::Debug, "debug one").unwrap();
    log_line!(h.logger, Severity::Info, "info one").unwrap();
    log_line!(h.logger, Severity::Detail, "detail one").unwrap();

    let echoed = h.diagnostics.echoed();
    assert_eq!(echoed.len(), 2);
    assert!(echoed[0].ends_with(" DEBUG: debug one\n"));
    assert!(echoed[1].ends_with(" INFO: info one\n"));

    // Persistence threshold moves at runtime; the echo threshold does not
    h.logger.set_persistence_level(Severity::Debug);
    log_line!(h.logger, Severity::Debug, "debug two").unwrap();
    h.logger.set_persistence_level(Severity::Warning);
    log_line!(h.logger, Severity::Debug, "debug three").unwrap();
    h.logger.shutdown();

    assert_eq!(bodies(&h.sink.text()), vec![" DEBUG: debug two"]);
    assert_eq!(h.diagnostics.echoed().len(), 4);
}

#[test]
fn test_filtered_message_not_formatted() {
    let sink = MemorySink::new();
    let diagnostics = CapturedDiagnostics::new();
    let logger = FileLogger::builder(test_config())
        .sink(sink.clone())
        .clock(FixedClock::failing())
        .diagnostics(diagnostics.clone())
        .start()
        .unwrap();

    // Below both thresholds, so the failing clock is never consulted
    log_line!(logger, Severity::Info, "ignored").unwrap();
    logger.shutdown();
    assert!(diagnostics.reports().is_empty());
}

#[test]
fn test_write_failure_does_not_stall_producers() {
    let h = start(test_config().with_buffer_size(256));
    h.sink.fail_next_writes(1);

    for i in 0..30 {
        log_line!(h.logger, Severity::Warning, "after failure {:02} with some padding", i).unwrap();
    }
    h.logger.shutdown();

    let bodies = bodies(&h.sink.text());
    assert!(!bodies.is_empty());
    assert!(bodies.len() < 30, "the failed buffer is lost");
    assert_eq!(bodies.last().unwrap(), " WARNING: after failure 29 with some padding");
    assert!(h.diagnostics.reports().iter().any(|r| r.starts_with("Failed to write")));
}

#[test]
fn test_flush_failure_is_reported() {
    let h = start(test_config());
    h.sink.fail_next_flushes(1);

    log_line!(h.logger, Severity::Warning, "written before the flush").unwrap();
    h.logger.shutdown();

    assert_eq!(bodies(&h.sink.text()), vec![" WARNING: written before the flush"]);
    assert!(h
        .diagnostics
        .reports()
        .iter()
        .any(|r| r.starts_with("Failed to flush test.0.txt: injected flush failure")));
}

#[test]
fn test_invalid_config_is_fatal() {
    let err = FileLogger::builder(test_config().with_buffer_size(0))
        .sink(MemorySink::new())
        .start()
        .unwrap_err();
    assert!(matches!(err, FileLoggerError::InvalidConfig(_)));
}

#[test]
fn test_initial_open_failure_is_fatal() {
    let sink = MemorySink::new();
    sink.fail_next_opens(1);
    let err = FileLogger::builder(test_config())
        .sink(sink.clone())
        .start()
        .unwrap_err();
    assert!(matches!(err, FileLoggerError::OpenLogFile { .. }));
    assert!(sink.opened().is_empty());
}
