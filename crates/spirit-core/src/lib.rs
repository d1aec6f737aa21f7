//! Foundational low-level utilities shared across Spirit crates.
//!
//! Provides the atomic file-write helper used for the persisted session template
//! and the unix-time helpers used for ingestion timestamps and uptime reporting.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, elapsed_seconds_since};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn time_utils_round_trip_bounds() {
        let now_s = current_unix_timestamp();
        let now_ms = current_unix_timestamp_ms();
        let now_ms_s = now_ms / 1_000;
        assert!(now_ms_s >= now_s);
        assert!(now_ms_s <= now_s.saturating_add(1));
    }

    #[test]
    fn elapsed_seconds_never_underflows() {
        let now_ms = current_unix_timestamp_ms();
        assert_eq!(elapsed_seconds_since(now_ms.saturating_add(60_000)), 0);
        assert!(elapsed_seconds_since(now_ms.saturating_sub(3_000)) >= 2);
    }

    #[test]
    fn write_text_atomic_writes_and_replaces_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested").join("auth-state.json");
        write_text_atomic(&path, "{\"cookies\":[]}").expect("first write");
        write_text_atomic(&path, "{\"cookies\":[1]}").expect("second write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "{\"cookies\":[1]}");
        let leftovers = std::fs::read_dir(path.parent().expect("parent"))
            .expect("list dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn write_text_atomic_rejects_directory_destination() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "x").expect_err("directory must fail");
        assert!(error.to_string().contains("is a directory"));
    }
}
