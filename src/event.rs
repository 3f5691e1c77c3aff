//! Event and log callback hooks for host applications.
//!
//! The engine reports content changes and caller-misuse warnings through
//! these callbacks so a host can forward them to its own logging without the
//! library picking a subscriber. Fine-grained diagnostics go through
//! `tracing` instead.

use std::sync::{Mutex, OnceLock};

/// Log level for debug callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

type EventCallback = Box<dyn Fn(&str, &str) + Send + Sync + 'static>;
type LogCallback = Box<dyn Fn(LogLevel, &str) + Send + Sync + 'static>;

fn event_callback() -> &'static Mutex<Option<EventCallback>> {
    static CALLBACK: OnceLock<Mutex<Option<EventCallback>>> = OnceLock::new();
    CALLBACK.get_or_init(|| Mutex::new(None))
}

fn log_callback() -> &'static Mutex<Option<LogCallback>> {
    static CALLBACK: OnceLock<Mutex<Option<LogCallback>>> = OnceLock::new();
    CALLBACK.get_or_init(|| Mutex::new(None))
}

/// Set the global event callback.
pub fn set_event_callback<F>(callback: F)
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    if let Ok(mut guard) = event_callback().lock() {
        *guard = Some(Box::new(callback));
    }
}

/// Remove the global event callback.
pub fn clear_event_callback() {
    if let Ok(mut guard) = event_callback().lock() {
        *guard = None;
    }
}

/// Emit an event to the registered callback.
pub fn emit_event(name: &str, data: &str) {
    if let Ok(guard) = event_callback().lock() {
        if let Some(callback) = guard.as_ref() {
            callback(name, data);
        }
    }
}

/// Set the global log callback.
pub fn set_log_callback<F>(callback: F)
where
    F: Fn(LogLevel, &str) + Send + Sync + 'static,
{
    if let Ok(mut guard) = log_callback().lock() {
        *guard = Some(Box::new(callback));
    }
}

/// Remove the global log callback.
pub fn clear_log_callback() {
    if let Ok(mut guard) = log_callback().lock() {
        *guard = None;
    }
}

/// Emit a log message.
pub fn emit_log(level: LogLevel, message: &str) {
    if let Ok(guard) = log_callback().lock() {
        if let Some(callback) = guard.as_ref() {
            callback(level, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Callbacks are process-wide, so both hooks are exercised in one test.
    #[test]
    fn test_callbacks() {
        let events = Arc::new(AtomicUsize::new(0));
        let events_clone = Arc::clone(&events);
        set_event_callback(move |name, _data| {
            if name == "test.event" {
                events_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        emit_event("test.event", "{}");
        emit_event("other.event", "{}");
        assert_eq!(events.load(Ordering::SeqCst), 1);
        clear_event_callback();
        emit_event("test.event", "{}");
        assert_eq!(events.load(Ordering::SeqCst), 1);

        let logs = Arc::new(AtomicUsize::new(0));
        let logs_clone = Arc::clone(&logs);
        set_log_callback(move |level, msg| {
            if level == LogLevel::Warn && msg == "careful" {
                logs_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        emit_log(LogLevel::Warn, "careful");
        emit_log(LogLevel::Info, "careful");
        assert_eq!(logs.load(Ordering::SeqCst), 1);
        clear_log_callback();
    }
}
