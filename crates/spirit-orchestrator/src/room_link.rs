use std::sync::OnceLock;

use regex::Regex;
use spirit_browser::RoomTarget;

use crate::ValidationError;

struct RoomLinkPatterns {
    room: Regex,
    access_key: Regex,
}

fn room_link_patterns() -> Option<&'static RoomLinkPatterns> {
    static PATTERNS: OnceLock<Option<RoomLinkPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(RoomLinkPatterns {
                room: Regex::new(r"room/([A-Za-z0-9-]+)").ok()?,
                access_key: Regex::new(r"key=([0-9]+)").ok()?,
            })
        })
        .as_ref()
}

/// Extracts the room key and optional access key from a shared room link and builds
/// the navigation URL under `room_base`.
pub fn parse_room_link(link: &str, room_base: &str) -> Result<RoomTarget, ValidationError> {
    let patterns = room_link_patterns().ok_or(ValidationError::InvalidTarget)?;
    let link = link.trim();
    let room_key = patterns
        .room
        .captures(link)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().to_string())
        .ok_or(ValidationError::InvalidTarget)?;
    let access_key = patterns
        .access_key
        .captures(link)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().to_string());

    let base = room_base.trim_end_matches('/');
    let url = match access_key.as_deref() {
        Some(key) => format!("{base}/room/{room_key}?key={key}"),
        None => format!("{base}/room/{room_key}"),
    };
    Ok(RoomTarget {
        room_key,
        access_key,
        url,
    })
}
