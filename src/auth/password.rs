use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

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

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_only_the_original_password() {
        let hash = hash_password("fl0ck-Sign1n#2026").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("fl0ck-Sign1n#2026", &hash).unwrap());
        assert!(!verify_password("fl0ck-sign1n#2026", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn same_password_hashes_differently_per_salt() {
        let a = hash_password("shared secret").unwrap();
        let b = hash_password("shared secret").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("shared secret", &a).unwrap());
        assert!(verify_password("shared secret", &b).unwrap());
    }

    #[test]
    fn garbage_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("whatever", "plainly-not-phc").is_err());
        assert!(verify_password("whatever", "").is_err());
    }
}
