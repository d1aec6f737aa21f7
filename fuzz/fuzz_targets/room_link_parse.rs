#![no_main]

use libfuzzer_sys::fuzz_target;
use spirit_orchestrator::{parse_room_link, DEFAULT_ROOM_BASE_URL};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Ok(target) = parse_room_link(&raw, DEFAULT_ROOM_BASE_URL) {
        assert!(!target.room_key.is_empty());
        assert!(target
            .room_key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-'));
        assert!(target.url.starts_with(DEFAULT_ROOM_BASE_URL));
        if let Some(access_key) = target.access_key.as_deref() {
            assert!(access_key.chars().all(|ch| ch.is_ascii_digit()));
            assert!(target.url.ends_with(access_key));
        }
    }
});
