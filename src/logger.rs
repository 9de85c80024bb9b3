use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{Level, LevelFilter, Log, Metadata, Record};

struct StderrLogger {
    level: AtomicUsize,
}

impl StderrLogger {
    const fn new() -> Self {
        Self {
            level: AtomicUsize::new(LevelFilter::Info as usize),
        }
    }

    fn current_level(&self) -> LevelFilter {
        filter_from_usize(self.level.load(Ordering::Relaxed))
    }

    fn set_level(&self, level: LevelFilter) {
        self.level.store(level as usize, Ordering::Relaxed);
    }
}

fn filter_from_usize(value: usize) -> LevelFilter {
    match value {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.current_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(io::stderr(), "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger::new();

pub fn level_for(debug: bool) -> Level {
    if debug { Level::Debug } else { Level::Info }
}

pub fn init_logger(level: Level) -> Result<(), log::SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(LevelFilter::Trace);
    set_log_level(level);
    Ok(())
}

pub fn set_log_level(level: Level) {
    LOGGER.set_level(level.to_level_filter());
}
