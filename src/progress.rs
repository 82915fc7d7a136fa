use std::io::{self, Write};
use std::time::Instant;

/// Receives chunk-level progress from long-running jobs.
pub trait ProgressSink {
    fn progress(&self, label: &str, current: usize, total: usize);
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&self, _label: &str, _current: usize, _total: usize) {}
}

/// Timestamped lines on stderr: `[mm:ss] label current/total (pct%)`.
pub struct ConsoleProgress {
    enabled: bool,
    started: Instant,
}

impl ConsoleProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            started: Instant::now(),
        }
    }

    fn emit(&self, line: std::fmt::Arguments<'_>) {
        if !self.enabled {
            return;
        }
        let ts = fmt_elapsed(self.started.elapsed().as_secs_f64());
        let _ = writeln!(io::stderr().lock(), "[{ts}] {line}");
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.emit(format_args!("{}", msg.as_ref()));
    }
}

impl ProgressSink for ConsoleProgress {
    fn progress(&self, label: &str, current: usize, total: usize) {
        let current = current.min(total);
        let pct = percent(current, total);
        self.emit(format_args!("{label} {current}/{total} ({pct:5.1}%)"));
    }
}

/// 0..=100; an empty job is complete.
pub fn percent(current: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (current.min(total) as f64 / total as f64) * 100.0
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_format() {
        assert_eq!(fmt_elapsed(65.4), "01:05");
        assert_eq!(fmt_elapsed(3725.0), "01:02:05");
    }

    #[test]
    fn percent_bounds() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(250, 1000), 25.0);
        assert_eq!(percent(2000, 1000), 100.0);
    }
}
