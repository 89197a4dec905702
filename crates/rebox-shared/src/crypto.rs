use rand::RngCore;

use crate::constants::{KDF_CONTEXT_PASSWORD, PASSWORD_SALT_SIZE};

pub fn generate_salt() -> [u8; PASSWORD_SALT_SIZE] {
    let mut salt = [0u8; PASSWORD_SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// BLAKE3 KDF with domain separation, salt || password
fn derive(salt: &[u8], password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_PASSWORD);
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize()
}

/// Hash a password for storage. Output format: `salt_hex$hash_hex`.
pub fn hash_password(password: &str) -> String {
    let salt = generate_salt();
    let hash = derive(&salt, password);
    format!("{}${}", hex::encode(salt), hash.to_hex())
}

/// Check a password against a value produced by [`hash_password`].
///
/// Malformed stored values never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, hash_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = blake3::Hash::from_hex(hash_hex) else {
        return false;
    };
    // blake3::Hash equality is constant-time
    derive(&salt, password) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_verify_roundtrip() {
        let stored = hash_password("demo123");
        assert!(verify_password("demo123", &stored));
        assert!(!verify_password("demo124", &stored));
    }

    #[test]
    fn test_salt_makes_hashes_differ() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn test_malformed_stored_value() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "nothex$nothex"));
        assert!(!verify_password("x", "abcd"));
    }
}
