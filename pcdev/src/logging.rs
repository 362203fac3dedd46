use core::fmt;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, set_logger, set_max_level};
use spin::Once;

/// Where formatted log lines go. The console belongs to the host, so the host
/// hands one in at [init].
pub type LogSink = fn(fmt::Arguments<'_>);

static SINK: Once<LogSink> = Once::new();

pub struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = SINK.get() else {
            return;
        };
        sink(format_args!(
            "\u{1B}[{}m[{:}] [{}] {}\u{1B}[0m",
            level_color(record.level()),
            record.level(),
            record.target(),
            record.args(),
        ));
    }

    fn flush(&self) {}
}

fn level_color(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 20,  // White
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}

/// Install [Logger] as the global logger, forwarding to `sink`.
///
/// Only the first call wins; later calls return the [SetLoggerError] from `log`.
pub fn init(sink: LogSink, level: LevelFilter) -> Result<(), SetLoggerError> {
    static LOGGER: Logger = Logger;
    set_logger(&LOGGER)?;
    SINK.call_once(|| sink);
    set_max_level(level);
    Ok(())
}

/// Improved debug macro,
/// only compiled in debug mode.
#[macro_export]
macro_rules! debug_ex {
    // debug_ex!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            ::log::log!(target: $target, ::log::Level::Debug, $($arg)+)
        }
    };

    // debug_ex!("a {} event", "log")
    ($($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            ::log::log!(::log::Level::Debug, $($arg)+)
        }
    }
}
