//! Reporter trait for dependency injection
//!
//! This trait allows the pipeline to report progress and status without
//! being coupled to a specific terminal implementation.

use std::time::Duration;

pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started (e.g. "Mirroring core").
    fn section(&self, title: &str);

    /// A transfer of `url` is about to start.
    fn fetching(&self, url: &str);

    /// Updates the progress of a download. `total` is the declared content length.
    fn downloading(&self, label: &str, current: u64, total: u64);

    /// A download finished successfully.
    fn downloaded(&self, label: &str, size: u64, elapsed: Duration);

    /// An artifact was added to a repository database.
    fn registered(&self, repository: &str, filename: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a success message.
    fn success(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn fetching(&self, url: &str) {
        (**self).fetching(url);
    }
    fn downloading(&self, label: &str, current: u64, total: u64) {
        (**self).downloading(label, current, total);
    }
    fn downloaded(&self, label: &str, size: u64, elapsed: Duration) {
        (**self).downloaded(label, size, elapsed);
    }
    fn registered(&self, repository: &str, filename: &str) {
        (**self).registered(repository, filename);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn success(&self, msg: &str) {
        (**self).success(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn fetching(&self, _: &str) {}
    fn downloading(&self, _: &str, _: u64, _: u64) {}
    fn downloaded(&self, _: &str, _: u64, _: Duration) {}
    fn registered(&self, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}

/// Download progress as a percentage of the declared size.
///
/// Not clamped: a server that sends more than it declared reports over 100.
/// A zero `total` yields 0.
pub fn progress_percent(current: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    current as f64 / total as f64 * 100.0
}
