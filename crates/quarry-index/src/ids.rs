//! Deterministic vector-store point ids derived from chunk content hashes.

/// Derive a v5-shaped UUID from a content hash.
///
/// Takes the first 32 hex chars, forces the version nibble to `5` and the
/// variant nibble to the RFC-4122 range, and inserts dashes at 8-4-4-4-12.
/// Stores that only accept UUID ids get a stable id per content hash; the
/// full hash still travels in the payload.
#[must_use]
pub fn point_id(content_hash: &str) -> String {
    debug_assert!(content_hash.len() >= 32);
    let mut raw: Vec<u8> = content_hash.bytes().take(32).collect();
    while raw.len() < 32 {
        raw.push(b'0');
    }

    raw[12] = b'5';
    let variant = hex_nibble(raw[16]).map_or(0x8, |v| (v & 0x3) | 0x8);
    raw[16] = HEX[variant as usize];

    let s = String::from_utf8_lossy(&raw);
    format!(
        "{}-{}-{}-{}-{}",
        &s[0..8],
        &s[8..12],
        &s[12..16],
        &s[16..20],
        &s[20..32]
    )
}

const HEX: &[u8; 16] = b"0123456789abcdef";

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
