//! Process memory probe for the health endpoint.

use std::path::Path;

const PROC_STATM_PATH: &str = "/proc/self/statm";
const PAGE_SIZE_BYTES: u64 = 4096;
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Resident set size as `"<n> MB"`, or `"unknown"` where procfs is unavailable.
pub(super) fn resident_memory_label() -> String {
    read_resident_bytes(Path::new(PROC_STATM_PATH))
        .map(|bytes| format!("{} MB", bytes / BYTES_PER_MB))
        .unwrap_or_else(|| "unknown".to_string())
}

fn read_resident_bytes(path: &Path) -> Option<u64> {
    let raw = std::fs::read_to_string(path).ok()?;
    parse_statm_resident_pages(&raw).map(|pages| pages.saturating_mul(PAGE_SIZE_BYTES))
}

fn parse_statm_resident_pages(raw: &str) -> Option<u64> {
    raw.split_whitespace().nth(1)?.parse::<u64>().ok()
}
