//! Available-memory probe for small boards.
//!
//! Encoding hundreds of images on a Raspberry Pi can exhaust RAM; callers
//! check this before and during long runs and warn instead of failing.

const MEMINFO_PATH: &str = "/proc/meminfo";

/// Warn before starting capture or encoding below this.
pub const LOW_MEMORY_MB: f64 = 200.0;
/// Warn mid-run below this.
pub const CRITICAL_MEMORY_MB: f64 = 100.0;

/// `MemAvailable` in megabytes, or `None` off Linux or when unreadable.
pub fn available_mb() -> Option<f64> {
    let text = std::fs::read_to_string(MEMINFO_PATH).ok()?;
    parse_available_kb(&text).map(|kb| kb as f64 / 1024.0)
}

fn parse_available_kb(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

/// Log available memory and warn when below `threshold_mb`.
pub fn warn_if_low(threshold_mb: f64) {
    match available_mb() {
        Some(mb) if mb < threshold_mb => {
            tracing::warn!(available_mb = %format!("{mb:.1}"), "low memory may affect performance");
        }
        Some(mb) => tracing::info!(available_mb = %format!("{mb:.1}"), "available memory"),
        None => tracing::debug!("memory information unavailable"),
    }
}
