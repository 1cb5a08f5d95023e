//! Progress line formatting

use std::time::Duration;

use armrepo_core::reporter::progress_percent;

/// Download progress as shown on the live line: ` 42 % / 100 %`.
pub fn format_progress(current: u64, total: u64) -> String {
    format!(" {:.0} % / 100 %", progress_percent(current, total))
}

/// Completion line for a finished transfer.
pub fn format_completed(elapsed: Duration) -> String {
    format!("Download completed in {:.2}s", elapsed.as_secs_f64())
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
