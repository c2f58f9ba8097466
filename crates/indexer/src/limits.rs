//! Bulk-indexing parallelism limits.
//!
//! Embedding is the bottleneck resource; running too many batches at once
//! risks device-memory exhaustion. The default degree is derived from the
//! host's CPU and memory, overridable through `LENS_INDEX_CONCURRENCY`, and
//! always clamped to a hard ceiling.

const MAX_BULK_CONCURRENCY: usize = 32;

fn total_memory_gib_linux_best_effort() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        let line = line.trim_start();
        if !line.starts_with("MemTotal:") {
            continue;
        }
        let kb = line
            .split_whitespace()
            .nth(1)
            .and_then(|v| v.parse::<u64>().ok())?;
        return Some(kb / 1024 / 1024);
    }
    None
}

fn default_bulk_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let cpu_default = if cpus <= 4 {
        1
    } else if cpus <= 12 {
        2
    } else {
        4
    };

    let Some(mem_gib) = total_memory_gib_linux_best_effort() else {
        return cpu_default;
    };

    let mem_default = if mem_gib <= 8 {
        1
    } else if mem_gib <= 32 {
        2
    } else {
        4
    };

    cpu_default.min(mem_default).max(1)
}

fn parse_bulk_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_BULK_CONCURRENCY)
}

/// Resolves the worker-pool size for one run. An explicit `configured` value
/// wins over the environment, which wins over the host-derived default.
pub fn bulk_concurrency(configured: Option<usize>) -> usize {
    if let Some(value) = configured {
        return value.clamp(1, MAX_BULK_CONCURRENCY);
    }
    let raw = std::env::var("LENS_INDEX_CONCURRENCY").ok();
    parse_bulk_concurrency(raw.as_deref(), default_bulk_concurrency())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bulk_concurrency_defaults_and_clamps() {
        let default_value = default_bulk_concurrency();
        assert_eq!(parse_bulk_concurrency(None, default_value), default_value);
        assert_eq!(
            parse_bulk_concurrency(Some(""), default_value),
            default_value
        );
        assert_eq!(
            parse_bulk_concurrency(Some("   "), default_value),
            default_value
        );
        assert_eq!(parse_bulk_concurrency(Some("2"), default_value), 2);
        assert_eq!(parse_bulk_concurrency(Some("0"), default_value), 1);
        assert_eq!(
            parse_bulk_concurrency(Some("999"), default_value),
            MAX_BULK_CONCURRENCY
        );
        assert_eq!(
            parse_bulk_concurrency(Some("abc"), default_value),
            default_value
        );
        assert_eq!(parse_bulk_concurrency(Some(" 5 "), default_value), 5);
    }

    #[test]
    fn explicit_configuration_wins_and_is_clamped() {
        assert_eq!(bulk_concurrency(Some(3)), 3);
        assert_eq!(bulk_concurrency(Some(0)), 1);
        assert_eq!(bulk_concurrency(Some(1000)), MAX_BULK_CONCURRENCY);
    }
}
