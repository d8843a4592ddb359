//! Short unique stream identifiers.
//!
//! Format: base62(seconds since 2025-01-01) + base62(6 random bytes),
//! roughly 14 characters. The time prefix keeps ids loosely time-ordered.

use std::time::{SystemTime, UNIX_EPOCH};

const EPOCH_2025: u64 = 1_735_689_600;
const BASE62: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Generates a new stream id.
pub fn new_stream_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .saturating_sub(EPOCH_2025);

    let mut random = [0u8; 6];
    getrandom::fill(&mut random).expect("getrandom failed");
    let mut n: u64 = 0;
    for b in random {
        n = n << 8 | b as u64;
    }

    let mut id = base62(secs);
    id.push_str(&base62(n));
    id
}

fn base62(mut n: u64) -> String {
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE62[(n % 62) as usize]);
        n /= 62;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_base62_and_unique() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = new_stream_id();
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()), "{id}");
            assert!(id.len() >= 8 && id.len() <= 20, "{id}");
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn base62_encoding() {
        assert_eq!(base62(0), "0");
        assert_eq!(base62(61), "z");
        assert_eq!(base62(62), "10");
    }
}
