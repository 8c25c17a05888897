//! Time formatting helpers.

use std::time::Duration;

/// Format a duration as a short human-readable string.
///
/// Sub-second durations are shown in milliseconds, since store
/// initialization usually finishes well within a second.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}.{:03}s", secs, duration.subsec_millis())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
