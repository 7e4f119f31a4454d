//! Correlation ids threaded through every log line and error response (§7),
//! and into `PaymentTransition.correlation_id`.

use rand::RngCore;

/// Generates a fresh correlation id: 16 random bytes, hex-encoded.
pub fn new_correlation_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn looks_like_32_hex_chars() {
        let id = new_correlation_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn is_randomized() {
        assert_ne!(new_correlation_id(), new_correlation_id());
    }
}
