//! 密码哈希

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const MIN_LENGTH: usize = 6;
const MAX_LENGTH: usize = 128;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password must be at least {0} characters")]
    TooShort(usize),
    #[error("Password must be at most {0} characters")]
    TooLong(usize),
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),
    #[error("Invalid password hash: {0}")]
    InvalidHash(String),
}

/// Argon2 哈希后的密码
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedPassword(String);

impl HashedPassword {
    pub fn from_plain(plain: &str) -> Result<Self, PasswordError> {
        if plain.len() < MIN_LENGTH {
            return Err(PasswordError::TooShort(MIN_LENGTH));
        }
        if plain.len() > MAX_LENGTH {
            return Err(PasswordError::TooLong(MAX_LENGTH));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?
            .to_string();
        Ok(Self(hash))
    }

    pub fn verify(&self, plain: &str) -> Result<bool, PasswordError> {
        let parsed =
            PasswordHash::new(&self.0).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn from_hash(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashedPassword([REDACTED])")
    }
}

/// 常量时间比较明文口令
///
/// 先各自取 SHA-256 摘要，比较耗时与口令长度和首个差异位置无关。
pub fn plain_matches(candidate: &str, expected: &str) -> bool {
    let a = Sha256::digest(candidate.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
