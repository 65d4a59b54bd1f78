use sha2::{Digest, Sha256};

/// SHA-256 fed chunk by chunk while a transfer streams.
#[derive(Default)]
pub struct StreamDigest {
    hasher: Sha256,
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

pub fn matches_hex(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_over_chunks_matches_whole() {
        let mut digest = StreamDigest::new();
        digest.update(b"hello ");
        digest.update(b"world");
        assert_eq!(
            digest.finalize_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn hex_compare_ignores_case() {
        assert!(matches_hex("abcdef", " ABCDEF "));
        assert!(!matches_hex("abcdef", "abcdee"));
    }
}
