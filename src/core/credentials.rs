use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::{DatabaseError, DbResult};

/// How user passwords are kept in the store
///
/// `Plaintext` keeps the credential verbatim, which is what existing user
/// records contain. Whether hashing should become the default is an open
/// product decision, so it is opt-in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStorage {
    /// Stored and compared verbatim
    #[default]
    Plaintext,

    /// Stored as a bcrypt hash
    Bcrypt,
}

impl fmt::Display for PasswordStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordStorage::Plaintext => write!(f, "plaintext"),
            PasswordStorage::Bcrypt => write!(f, "bcrypt"),
        }
    }
}

/// Seals and checks user passwords according to the configured storage
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    storage: PasswordStorage,
    bcrypt_cost: u32,
}

impl PasswordPolicy {
    pub fn new(storage: PasswordStorage, bcrypt_cost: u32) -> Self {
        Self { storage, bcrypt_cost }
    }

    /// Produce the value to store for a new password
    pub fn seal(&self, password: &str) -> DbResult<String> {
        match self.storage {
            PasswordStorage::Plaintext => Ok(password.to_string()),
            PasswordStorage::Bcrypt => bcrypt::hash(password, self.bcrypt_cost)
                .map_err(|e| DatabaseError::InternalError(format!("Password hashing failed: {}", e))),
        }
    }

    /// Check a login attempt against the stored value
    pub fn verify(&self, candidate: &str, stored: &str) -> bool {
        match self.storage {
            PasswordStorage::Plaintext => candidate == stored,
            PasswordStorage::Bcrypt => match bcrypt::verify(candidate, stored) {
                Ok(matches) => matches,
                Err(e) => {
                    warn!("Stored password is not a valid bcrypt hash: {}", e);
                    false
                }
            },
        }
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(PasswordStorage::Plaintext, bcrypt::DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_round_trip() {
        let policy = PasswordPolicy::default();
        let stored = policy.seal("manoj28").unwrap();

        assert_eq!(stored, "manoj28");
        assert!(policy.verify("manoj28", &stored));
        assert!(!policy.verify("manoj29", &stored));
    }

    #[test]
    fn test_bcrypt_round_trip() {
        let policy = PasswordPolicy::new(PasswordStorage::Bcrypt, 4);
        let stored = policy.seal("harvest-2024").unwrap();

        assert_ne!(stored, "harvest-2024");
        assert!(policy.verify("harvest-2024", &stored));
        assert!(!policy.verify("harvest-2025", &stored));
    }

    #[test]
    fn test_bcrypt_rejects_plaintext_record() {
        let policy = PasswordPolicy::new(PasswordStorage::Bcrypt, 4);
        assert!(!policy.verify("secret", "secret"));
    }
}
