//! Transport log sinks.
//!
//! The configured log level decides which of the two sinks handed to the
//! transport are live. Sinks never fail: a disabled sink drops the line, an
//! enabled one hands it to its [`LogWriter`].

use std::fmt;
use std::sync::Arc;

pub const DEBUG_LOG_LEVEL: &str = "debug";
pub const ERROR_LOG_LEVEL: &str = "error";

pub const DEBUG_PREFIX: &str = "[KAFKA DEBUG]";
pub const ERROR_PREFIX: &str = "[KAFKA ERROR]";

/// Destination for prefixed transport log lines
pub trait LogWriter: Send + Sync {
    fn write(&self, severity: Severity, line: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Error,
}

/// Writes sink output as `tracing` events
#[derive(Debug, Default)]
pub struct TracingWriter;

impl LogWriter for TracingWriter {
    fn write(&self, severity: Severity, line: &str) {
        match severity {
            Severity::Debug => tracing::debug!(target: "kafka_transport", "{line}"),
            Severity::Error => tracing::error!(target: "kafka_transport", "{line}"),
        }
    }
}

#[derive(Clone)]
pub struct LogSink {
    severity: Severity,
    writer: Option<Arc<dyn LogWriter>>,
}

impl LogSink {
    pub fn noop(severity: Severity) -> Self {
        Self {
            severity,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn prefix(&self) -> &'static str {
        match self.severity {
            Severity::Debug => DEBUG_PREFIX,
            Severity::Error => ERROR_PREFIX,
        }
    }

    pub fn log(&self, message: &str) {
        if let Some(writer) = &self.writer {
            writer.write(self.severity, &format!("{} {message}", self.prefix()));
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("severity", &self.severity)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LogSinks {
    pub debug: LogSink,
    pub error: LogSink,
}

impl LogSinks {
    pub fn disabled() -> Self {
        Self {
            debug: LogSink::noop(Severity::Debug),
            error: LogSink::noop(Severity::Error),
        }
    }
}

/// Resolve the sinks for a level, writing enabled output through `tracing`.
pub fn resolve_log_sinks(level: &str) -> LogSinks {
    resolve_log_sinks_with(level, Arc::new(TracingWriter))
}

/// Resolve the sinks for a level (case-insensitive).
///
/// `debug` enables both sinks, `error` only the error sink, anything else
/// neither.
pub fn resolve_log_sinks_with(level: &str, writer: Arc<dyn LogWriter>) -> LogSinks {
    let mut sinks = LogSinks::disabled();

    match level.to_lowercase().as_str() {
        DEBUG_LOG_LEVEL => {
            sinks.debug.writer = Some(Arc::clone(&writer));
            sinks.error.writer = Some(writer);
        }
        ERROR_LOG_LEVEL => {
            sinks.error.writer = Some(writer);
        }
        _ => {}
    }

    sinks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<(Severity, String)>>,
    }

    impl LogWriter for Capture {
        fn write(&self, severity: Severity, line: &str) {
            self.lines.lock().unwrap().push((severity, line.to_string()));
        }
    }

    #[test]
    fn test_debug_enables_both_any_case() {
        for level in ["debug", "DEBUG", "Debug"] {
            let sinks = resolve_log_sinks(level);
            assert!(sinks.debug.is_enabled(), "{level}");
            assert!(sinks.error.is_enabled(), "{level}");
        }
    }

    #[test]
    fn test_error_enables_error_only() {
        let sinks = resolve_log_sinks("error");
        assert!(!sinks.debug.is_enabled());
        assert!(sinks.error.is_enabled());
    }

    #[test]
    fn test_other_levels_disable_both() {
        for level in ["", "warn", "info", "off"] {
            let sinks = resolve_log_sinks(level);
            assert!(!sinks.debug.is_enabled(), "{level}");
            assert!(!sinks.error.is_enabled(), "{level}");
        }
    }

    #[test]
    fn test_sinks_prefix_lines() {
        let capture = Arc::new(Capture::default());
        let sinks = resolve_log_sinks_with("debug", capture.clone());

        sinks.debug.log("fetching metadata");
        sinks.error.log("broker down");

        let lines = capture.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                (Severity::Debug, "[KAFKA DEBUG] fetching metadata".to_string()),
                (Severity::Error, "[KAFKA ERROR] broker down".to_string()),
            ]
        );
    }

    #[test]
    fn test_disabled_sink_drops_lines() {
        let capture = Arc::new(Capture::default());
        let sinks = resolve_log_sinks_with("error", capture.clone());

        sinks.debug.log("ignored");

        assert!(capture.lines.lock().unwrap().is_empty());
    }
}
