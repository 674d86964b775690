// Per-request nonce generation: millisecond timestamp joined with random
// base36 characters, enough to bound replay usefulness per envelope.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const RANDOM_LEN: usize = 13;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates a nonce of the form `{unix_millis}_{13 base36 chars}`.
#[must_use]
pub fn generate(now: SystemTime) -> String {
    let millis = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let mut rng = rand::thread_rng();
    let random: String = (0..RANDOM_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{millis}_{random}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nonce_carries_timestamp_prefix() {
        let now = SystemTime::now();
        let millis = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let nonce = generate(now);
        let (prefix, random) = nonce.split_once('_').expect("separator");
        assert_eq!(prefix, millis.to_string());
        assert_eq!(random.len(), RANDOM_LEN);
        assert!(random.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn nonces_are_unique_within_a_burst() {
        let now = SystemTime::now();
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate(now)), "duplicate nonce in burst");
        }
    }
}
