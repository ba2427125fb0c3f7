//! Utility functions for the quiz room service

use chrono::{DateTime, Utc};
use rand::Rng;

/// Alphabet room codes are drawn from
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a room code
pub const ROOM_CODE_LEN: usize = 6;

/// Generate a candidate room code.
///
/// Uniqueness is NOT guaranteed here; the caller checks the registry and
/// regenerates on collision.
pub fn generate_room_code() -> String {
    generate_room_code_with(&mut rand::thread_rng(), ROOM_CODE_ALPHABET, ROOM_CODE_LEN)
}

/// Generate a room code from a caller-supplied RNG and alphabet.
///
/// Tests use a tiny alphabet to exercise the collision-retry path.
pub fn generate_room_code_with<R: Rng>(rng: &mut R, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_shape() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code
                .bytes()
                .all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_room_code_custom_alphabet() {
        let mut rng = rand::thread_rng();
        let code = generate_room_code_with(&mut rng, b"AB", 4);
        assert_eq!(code.len(), 4);
        assert!(code.chars().all(|c| c == 'A' || c == 'B'));
    }
}
