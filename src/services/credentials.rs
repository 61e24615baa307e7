use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use rand_core::{OsRng, RngCore};

pub struct HashedPassword {
    pub hash: String,
    pub salt: String,
}

pub fn hash_password(password: &str) -> anyhow::Result<HashedPassword> {
    let salt = SaltString::generate(OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(HashedPassword {
        hash,
        salt: salt.as_str().to_string(),
    })
}

/// Opaque API token handed to a user on creation.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::{password_hash::PasswordHash, PasswordVerifier};

    #[test]
    fn test_hash_verifies() {
        let hashed = hash_password("s3cret").unwrap();
        assert!(hashed.hash.contains(&hashed.salt));
        let parsed = PasswordHash::new(&hashed.hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"s3cret", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"wrong", &parsed)
            .is_err());
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }
}
