//! Log-based timing for long-running engine operations.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use log::Level;

/// Logs how long its scope took when dropped. A timer created while its level
/// is disabled does nothing.
pub struct ScopedTimer {
    label: Option<Cow<'static, str>>,
    level: Level,
    start: Instant,
}

impl ScopedTimer {
    pub fn with_level(label: impl Into<Cow<'static, str>>, level: Level) -> Self {
        Self {
            label: log::log_enabled!(level).then(|| label.into()),
            level,
            start: Instant::now(),
        }
    }

    pub fn info(label: impl Into<Cow<'static, str>>) -> Self {
        Self::with_level(label, Level::Info)
    }

    /// Only builds the label when debug logging is on.
    pub fn debug_lazy<F>(label: F) -> Self
    where
        F: FnOnce() -> String,
    {
        let enabled = log::log_enabled!(Level::Debug);
        Self {
            label: enabled.then(|| Cow::Owned(label())),
            level: Level::Debug,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let Some(label) = &self.label {
            log::log!(self.level, "{} took {}", label, format_duration(self.start.elapsed()));
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_millis(1) {
        format!("{} us", duration.as_micros())
    } else {
        format!("{} ms", duration.as_millis())
    }
}

pub fn measure<T, F>(label: impl Into<Cow<'static, str>>, level: Level, f: F) -> T
where
    F: FnOnce() -> T,
{
    let _timer = ScopedTimer::with_level(label, level);
    f()
}

pub fn measure_info<T, F>(label: impl Into<Cow<'static, str>>, f: F) -> T
where
    F: FnOnce() -> T,
{
    measure(label, Level::Info, f)
}
