//! Client identifier anonymization
//!
//! Every client identifier is replaced by its SHA-512 digest before it is
//! written to the TSV, published in statistics, or logged.

use sha2::{Digest, Sha512};

/// Hash a raw client identifier into a lowercase hex SHA-512 digest
pub fn hash_client_id(client_id: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(client_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_client_id("abc-123"), hash_client_id("abc-123"));
    }

    #[test]
    fn test_hash_is_fixed_length_hex() {
        for input in ["", "a", "a much longer client identifier with spaces"] {
            let digest = hash_client_id(input);
            assert_eq!(digest.len(), 128);
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_distinct_inputs_distinct_digests() {
        let ids: Vec<String> = (0..500).map(|i| format!("client-{}", i)).collect();
        let digests: std::collections::HashSet<String> =
            ids.iter().map(|id| hash_client_id(id)).collect();
        assert_eq!(digests.len(), ids.len());
    }

    #[test]
    fn test_known_vector() {
        // SHA-512("abc") from FIPS 180-2
        assert_eq!(
            hash_client_id("abc"),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn test_digest_does_not_contain_raw_id() {
        let raw = "deadbeef";
        assert!(!hash_client_id(raw).contains(raw));
    }
}
