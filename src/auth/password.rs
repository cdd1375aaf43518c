use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

use rand::rngs::OsRng;
use tracing::{error, warn};

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// A real Argon2 hash of a throwaway secret, built once per process.
fn dummy_hash() -> &'static str {
    DUMMY_HASH.get_or_init(|| hash_password("unused-login-placeholder").unwrap_or_default())
}

/// Hashes with a fresh random salt; output is an Argon2id PHC string.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Returns `false` for a mismatch and for a hash that does not parse.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Verifies against `hash`, or against a dummy hash when there is no stored record,
/// so an unknown account costs the same Argon2 work as a wrong password.
/// Always `false` without a stored hash.
pub fn verify_stored_or_dummy(plain: &str, hash: Option<&str>) -> bool {
    match hash {
        Some(hash) => verify_password(plain, hash),
        None => {
            let _ = verify_password(plain, dummy_hash());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("secret1").unwrap();
        let b = hash_password("secret1").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("secret1"));
        assert!(verify_password("secret1", &a));
        assert!(verify_password("secret1", &b));
    }

    #[test]
    fn dummy_hash_is_a_real_argon2_hash() {
        let parsed = PasswordHash::new(dummy_hash()).expect("dummy hash parses");
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert!(!verify_stored_or_dummy("unused-login-placeholder", None));
    }

    #[test]
    fn stored_hash_is_used_when_present() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_stored_or_dummy("secret1", Some(&hash)));
        assert!(!verify_stored_or_dummy("secret2", Some(&hash)));
    }
}
