//! One-way password hashing.
//!
//! Stateless wrapper around bcrypt with a fixed work factor. Neither the
//! password nor the digest is ever logged from here.

/// bcrypt work factor used for every new digest.
pub const HASH_COST: u32 = 12;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hashing(#[source] bcrypt::BcryptError),

    #[error("stored password digest is not a valid bcrypt hash")]
    InvalidDigest,
}

/// Produce a salted bcrypt digest of `password`.
///
/// CPU-bound: call from `spawn_blocking` when on the async runtime.
pub fn hash(password: &str) -> Result<String, PasswordError> {
    bcrypt::hash(password, HASH_COST).map_err(PasswordError::Hashing)
}

/// Check `password` against a stored digest.
///
/// A wrong password is `Ok(false)`. Only a structurally broken digest is an
/// error.
pub fn verify(password: &str, digest: &str) -> Result<bool, PasswordError> {
    match bcrypt::verify(password, digest) {
        Ok(matched) => Ok(matched),
        Err(
            bcrypt::BcryptError::InvalidHash(_)
            | bcrypt::BcryptError::InvalidPrefix(_)
            | bcrypt::BcryptError::InvalidCost(_)
            | bcrypt::BcryptError::InvalidBase64(_),
        ) => Err(PasswordError::InvalidDigest),
        Err(e) => Err(PasswordError::Hashing(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_matches_only_the_hashed_password() {
        // Low cost keeps the test fast; the format is identical.
        let digest = bcrypt::hash("pa55word", 4).unwrap();

        assert!(verify("pa55word", &digest).unwrap());
        assert!(!verify("pa55w0rd", &digest).unwrap());
    }

    #[test]
    fn hash_uses_fixed_cost() {
        let digest = hash("correct horse").unwrap();
        assert!(digest.starts_with("$2b$12$"));
        assert_eq!(digest.len(), 60);
        assert!(verify("correct horse", &digest).unwrap());
    }

    #[test]
    fn malformed_digest_is_an_error() {
        let err = verify("anything", "not-a-bcrypt-digest").unwrap_err();
        assert!(matches!(err, PasswordError::InvalidDigest));
    }
}
